use anyhow::Result;
use xbundle_core::TokioFileSystem;
use xbundle_core::tree::{self, TreeOptions};

use super::Project;
use crate::cli_args::TreeArgs;
use crate::output;

pub async fn handle_tree_command(args: TreeArgs) -> Result<()> {
    let fs = TokioFileSystem;
    let project = Project::open(&args.project_config, &fs).await?;
    let checked = project.resolve_checked(&args.selection).await?;

    let mut options = TreeOptions::from(&project.config.tree);
    if args.no_sizes {
        options.show_sizes = false;
    }
    let nodes = tree::build_nodes(&project.catalog, &project.decisions, &checked, options);
    let root_name = project.catalog.root_name();

    let format = output::resolve_format(&args.format_output, "text")?;
    output::print_data_or_text(&nodes, || tree::render(&nodes, root_name), format)
}
