use clap::{ArgAction, Parser, Subcommand, ValueHint};

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}",
    arg_required_else_help = true
)]
pub struct Args {
    /// Set output verbosity
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress outputs
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output as json
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Disable colors in output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Provide custom config file
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<String>,

    /// Set proxy for upstream requests
    #[arg(required = false, long, short = 'P', global = true)]
    pub proxy: Option<String>,

    /// Set user agent for upstream requests
    #[arg(required = false, long, short = 'A', global = true)]
    pub user_agent: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate default config
    #[clap(name = "defconfig")]
    DefConfig,

    /// Show a package document, or one release of it
    #[command(arg_required_else_help = true)]
    Info {
        /// Package name, e.g. `left-pad` or `@babel/core`
        #[arg(required = true)]
        name: String,

        /// Version, dist-tag or range
        #[arg(required = false)]
        version: Option<String>,
    },

    /// Download a release archive through the cache
    #[command(arg_required_else_help = true)]
    Fetch {
        #[arg(required = true)]
        name: String,

        #[arg(required = true)]
        version: String,

        /// Output file (default: `<name>-<version>.tgz` in the current directory)
        #[arg(required = false, short, long, value_hint = ValueHint::FilePath)]
        output: Option<String>,
    },

    /// Follow the upstream change feed until interrupted
    Replicate,

    /// Show cache statistics
    Stats,
}
