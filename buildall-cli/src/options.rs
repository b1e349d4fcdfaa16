//! Command-line options and their translation into a [`RunConfig`].

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use buildall_core::exclusions::DEFAULT_EXCLUSIONS_FILE;
use buildall_core::version::{normalize_token, parse_cuda_token, split_tokens};
use buildall_core::{Channel, ChannelPolicy, VariantAxes};
use buildall_pipeline::upload::DEFAULT_MAX_RETRIES;
use buildall_pipeline::{BuildOptions, RunConfig, SelectorFlags};
use buildall_render::RenderOrder;

#[derive(Parser, Debug)]
#[command(
    name = "buildall",
    version,
    about = "Build every conda recipe variant that is not published yet",
    long_about = None,
)]
pub struct Cli {
    /// Recipe directories. `*` and `?` are expanded in the last component.
    #[arg(required = true, num_args = 1..)]
    pub recipes: Vec<String>,

    /// Channels searched for already-published packages.
    /// Defaults to the owner's main, dev, rc and beta labels.
    #[arg(long, num_args = 1.., value_name = "CHANNEL")]
    pub check_against: Vec<String>,

    /// Report what would be built; the exit status is the number of builds.
    #[arg(long)]
    pub dry_run: bool,

    /// Upload built packages to this account.
    #[arg(long, value_name = "NAME")]
    pub upload: Option<String>,

    /// Build and upload even if the package is already published.
    #[arg(long)]
    pub force: bool,

    /// Build even if the package already exists locally.
    #[arg(long)]
    pub rebuild: bool,

    /// Upload to the dev label.
    #[arg(long, requires = "force")]
    pub dev: bool,

    /// Skip recipe tests.
    #[arg(long)]
    pub no_test: bool,

    /// Build one variant of each package per round instead of one package at a time.
    #[arg(long)]
    pub cycle_packages: bool,

    /// Python versions, comma or space separated (`27,36` or `3.6 3.7`).
    #[arg(long, default_value = "27,36,37")]
    pub python: String,

    /// NumPy versions.
    #[arg(long, default_value = "1.11")]
    pub numpy: String,

    /// CUDA versions (`92,100` or `9.2,10.0`).
    #[arg(long)]
    pub cuda: Option<String>,

    /// Delete packages after they are built (and uploaded).
    #[arg(short = 'c', long)]
    pub clean: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Fully render recipes, sources included, before deciding what to build.
    #[arg(long)]
    pub finalize: bool,

    /// Directory for fully rendered recipes (with `--finalize`).
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// conda executable.
    #[arg(long, env = "CONDA_EXE", default_value = "conda")]
    pub conda: PathBuf,

    /// anaconda-client executable.
    #[arg(long, default_value = "anaconda")]
    pub anaconda: PathBuf,

    /// Account whose label channels are checked and used.
    #[arg(long, default_value = "omnia")]
    pub owner: String,

    /// Channel placed before the recipe's channels when building.
    #[arg(long, default_value = "conda-forge")]
    pub upstream_channel: String,

    /// Channel placed after the recipe's channels when building.
    #[arg(long, default_value = "defaults")]
    pub fallback_channel: String,

    /// Packages whose pre-releases still go to the regular labels.
    #[arg(long, default_value = DEFAULT_EXCLUSIONS_FILE)]
    pub pre_blacklist: PathBuf,

    /// Upload attempts before giving up.
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,
}

impl Cli {
    pub fn channel_policy(&self) -> ChannelPolicy {
        ChannelPolicy {
            owner: self.owner.clone(),
            upstream: Channel::from(self.upstream_channel.as_str()),
            fallback: Channel::from(self.fallback_channel.as_str()),
        }
    }

    pub fn variant_axes(&self) -> Result<VariantAxes> {
        let python = split_tokens(&self.python).iter().map(|t| normalize_token(t)).collect();
        let numpy = split_tokens(&self.numpy).iter().map(|t| normalize_token(t)).collect();
        let cuda = match &self.cuda {
            Some(raw) => split_tokens(raw)
                .iter()
                .map(|t| parse_cuda_token(t))
                .collect::<Result<Vec<_>, _>>()
                .context("invalid --cuda value")?,
            None => vec![],
        };
        Ok(VariantAxes { python, numpy, cuda })
    }

    pub fn run_config(&self, recipe_dirs: Vec<PathBuf>, policy: &ChannelPolicy) -> Result<RunConfig> {
        let check_against = if self.check_against.is_empty() {
            policy.default_check_against()
        } else {
            self.check_against.iter().map(|c| Channel::from(c.as_str())).collect()
        };
        let order = if self.cycle_packages {
            RenderOrder::Cycle
        } else {
            RenderOrder::PackageMajor
        };

        Ok(RunConfig {
            recipe_dirs,
            axes: self.variant_axes()?,
            check_against,
            order,
            finalize: self.finalize,
            work_dir: self.work_dir.clone(),
            selector: SelectorFlags {
                force: self.force,
                rebuild: self.rebuild,
            },
            build: BuildOptions {
                no_test: self.no_test,
                upload_user: self.upload.clone(),
                force: self.force,
                dev: self.dev,
                clean: self.clean,
            },
            dry_run: self.dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("buildall").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_expand_to_three_pythons() {
        let cli = parse(&["recipes/openmm"]);
        let axes = cli.variant_axes().unwrap();
        assert_eq!(axes.python, ["2.7", "3.6", "3.7"]);
        assert_eq!(axes.numpy, ["1.11"]);
        assert!(axes.cuda.is_empty());
    }

    #[test]
    fn cuda_tokens_are_parsed() {
        let cli = parse(&["r", "--cuda", "92,10.0"]);
        let cuda = cli.variant_axes().unwrap().cuda;
        assert_eq!(cuda[0].full, "9.2");
        assert_eq!(cuda[1].short, "100");
    }

    #[test]
    fn dev_requires_force() {
        let args = ["buildall", "r", "--dev"];
        assert!(Cli::try_parse_from(args).is_err());
        assert!(Cli::try_parse_from(["buildall", "r", "--dev", "--force"]).is_ok());
    }

    #[test]
    fn check_against_defaults_to_owner_labels() {
        let cli = parse(&["r", "--owner", "choderalab"]);
        let policy = cli.channel_policy();
        let config = cli.run_config(vec![], &policy).unwrap();
        assert_eq!(config.check_against.len(), 4);
        assert_eq!(config.check_against[0], Channel::from("choderalab/label/main"));
    }

    #[test]
    fn flags_reach_the_run_config() {
        let cli = parse(&[
            "r",
            "--upload",
            "omnia",
            "--force",
            "--no-test",
            "-c",
            "--cycle-packages",
            "--check-against",
            "conda-forge",
        ]);
        let config = cli.run_config(vec![], &cli.channel_policy()).unwrap();
        assert_eq!(config.build.upload_user.as_deref(), Some("omnia"));
        assert!(config.build.clean && config.build.no_test && config.selector.force);
        assert_eq!(config.order, RenderOrder::Cycle);
        assert_eq!(config.check_against, [Channel::from("conda-forge")]);
    }
}
