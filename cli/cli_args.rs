use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Args, Debug, Clone, Default)]
pub struct ProjectConfigOpts {
    #[arg(
        long,
        help = "Specify the target project directory (default: current dir).",
        help_heading = "Project Setup",
        value_name = "PATH"
    )]
    pub project_root: Option<PathBuf>,

    #[arg(
        long,
        help = "Specify path/filename of the TOML config file (default: .xtools/xbundle/xbundle.toml).",
        value_name = "CONFIG_FILE",
        conflicts_with = "disable_config_file",
        help_heading = "Project Setup"
    )]
    pub config_file: Option<String>,

    #[arg(
        long,
        help = "Disable loading any TOML config file.",
        conflicts_with = "config_file",
        help_heading = "Project Setup"
    )]
    pub disable_config_file: bool,

    #[arg(
        long,
        help = "Specify the project name (overrides config/dir name).",
        value_name = "NAME",
        help_heading = "Project Setup"
    )]
    pub project_name: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SelectionOpts {
    #[arg(
        short = 's',
        long = "select",
        value_name = "PATH",
        action = clap::ArgAction::Append,
        help = "Check a file or directory (relative to the project root). Repeatable.",
        help_heading = "Selection"
    )]
    pub select: Vec<PathBuf>,

    #[arg(
        long = "state",
        value_name = "ID",
        help = "Start from the checked items of a saved selection state.",
        help_heading = "Selection"
    )]
    pub state: Option<String>,
}

impl SelectionOpts {
    pub fn is_empty(&self) -> bool {
        self.select.is_empty() && self.state.is_none()
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct FormatOutputOpts {
    #[arg(
        short = 'f',
        long,
        help = "Set the output format.",
        value_name = "FORMAT",
        value_parser = ["text", "json", "yaml"],
        help_heading = "Output Formatting"
    )]
    pub format: Option<String>,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Bundle project files into a token-budgeted context for AI models.",
    long_about = "xbundle catalogues a project directory, filters it through configurable file groups, \nrenders a directory tree and concatenates the selected files until a token budget is spent. \nSelections can be saved and reloaded as named states.",
    help_template = "{about-section}\nUsage: {usage}\n\n{all-args}{after-help}",
    after_help = "EXAMPLES:\n  xbundle tree -s src\n  xbundle bundle -s src -s Cargo.toml --max-tokens 8000\n  xbundle state save -s src --label \"core only\"\n  xbundle bundle --state <ID> -f json --save bundle.json",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        global = true,
        help = "Increase message verbosity (-v, -vv)."
    )]
    pub verbose: u8,

    #[arg(
        short,
        long,
        global = true,
        help = "Silence informational messages and warnings."
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    #[command(visible_alias = "b", about = "Assemble the selected files into a bundle.")]
    Bundle(BundleArgs),

    #[command(
        visible_alias = "tr",
        about = "Print the filtered directory tree for a selection."
    )]
    Tree(TreeArgs),

    #[command(
        visible_alias = "t",
        about = "Estimate the token cost of files or standard input."
    )]
    Tokens(TokensArgs),

    #[command(about = "Save, list, inspect, rename and delete selection states.")]
    State(StateArgs),

    #[command(about = "Generate or save shell completion scripts.")]
    Completion(CompletionArgs),

    #[command(about = "Show or save the default configuration file structure.")]
    Config(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BundleArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[clap(flatten)]
    pub selection: SelectionOpts,
    #[clap(flatten)]
    pub format_output: FormatOutputOpts,

    #[arg(
        short = 'm',
        long,
        value_name = "TOKENS",
        help = "Override [budget].max_tokens for this run.",
        help_heading = "Budget"
    )]
    pub max_tokens: Option<usize>,

    #[arg(
        long,
        help = "Leave the directory tree out of the bundle.",
        help_heading = "Output Control"
    )]
    pub no_tree: bool,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write the bundle to FILE instead of standard output.",
        help_heading = "Output Control"
    )]
    pub save: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct TreeArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[clap(flatten)]
    pub selection: SelectionOpts,
    #[clap(flatten)]
    pub format_output: FormatOutputOpts,

    #[arg(long, help = "Do not print file sizes next to files.")]
    pub no_sizes: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TokensArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[clap(flatten)]
    pub format_output: FormatOutputOpts,

    #[arg(
        value_name = "FILE",
        help = "Files to estimate. Reads standard input when none are given."
    )]
    pub files: Vec<PathBuf>,

    #[arg(
        long,
        value_name = "ENCODING",
        help = "Tokenizer encoding or model name (overrides [budget].encoding)."
    )]
    pub encoding: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct StateArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[command(subcommand)]
    pub action: StateAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum StateAction {
    #[command(about = "Save the given selection as a new state and print its id.")]
    Save {
        #[arg(
            short = 's',
            long = "select",
            value_name = "PATH",
            action = clap::ArgAction::Append,
            required = true,
            help = "File or directory to check. Repeatable."
        )]
        select: Vec<PathBuf>,
        #[arg(short, long, value_name = "LABEL", help = "Human-readable label.")]
        label: Option<String>,
    },
    #[command(visible_alias = "ls", about = "List saved states, newest first.")]
    List {
        #[clap(flatten)]
        format_output: FormatOutputOpts,
    },
    #[command(about = "Show the checked items of a saved state.")]
    Show {
        id: String,
        #[clap(flatten)]
        format_output: FormatOutputOpts,
    },
    #[command(visible_alias = "rm", about = "Delete a saved state.")]
    Delete { id: String },
    #[command(about = "Change or clear the label of a saved state.")]
    Rename { id: String, label: Option<String> },
}

#[derive(Args, Debug, Clone)]
pub struct CompletionArgs {
    #[arg(
        long,
        value_name = "SHELL",
        default_value = "fish",
        help = "Shell to generate completions for."
    )]
    pub shell: Shell,
    #[arg(
        long,
        help = "Save completion script to default location (prompts overwrite)."
    )]
    pub save: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[arg(
        long,
        help = "Save default config structure to default path (prompts overwrite)."
    )]
    pub save: bool,
}
