//! Variant cross product and output ordering.

use buildall_core::{VariantAxes, VariantConfig};

/// Order in which rendered variants are handed to the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderOrder {
    /// Every variant of the first recipe, then every variant of the next.
    #[default]
    PackageMajor,
    /// One variant per recipe per round, until all recipes are exhausted.
    Cycle,
}

/// Cross product of the axes: python outermost, then numpy, then cuda.
///
/// An empty cuda axis contributes a single "no cuda" value; an empty python
/// or numpy axis yields no combinations.
pub fn expand_axes(axes: &VariantAxes) -> Vec<VariantConfig> {
    let cuda: Vec<_> = if axes.cuda.is_empty() {
        vec![None]
    } else {
        axes.cuda.iter().cloned().map(Some).collect()
    };

    let mut out = Vec::with_capacity(axes.python.len() * axes.numpy.len() * cuda.len());
    for python in &axes.python {
        for numpy in &axes.numpy {
            for cuda in &cuda {
                out.push(VariantConfig {
                    python: python.clone(),
                    numpy: numpy.clone(),
                    cuda: cuda.clone(),
                });
            }
        }
    }
    out
}

/// Round-robin over `groups`, keeping group order within each round.
///
/// `[[A1, A2, A3], [B1], [C1, C2]]` → `A1, B1, C1, A2, C2, A3`.
pub fn interleave<T>(groups: Vec<Vec<T>>) -> Vec<T> {
    let total = groups.iter().map(Vec::len).sum();
    let mut iters: Vec<_> = groups.into_iter().map(Vec::into_iter).collect();
    let mut out = Vec::with_capacity(total);
    while out.len() < total {
        for it in iters.iter_mut() {
            if let Some(item) = it.next() {
                out.push(item);
            }
        }
    }
    out
}
