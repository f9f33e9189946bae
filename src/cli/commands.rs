//! Command dispatch

use std::io;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::generate;
use tracing::{debug, instrument};

use crate::application::{HeaderRequest, TableAxes};
use crate::cli::args::{Cli, Commands, ConfigCommands, DocumentArgs};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{global_config_path, local_config_path, Settings};
use crate::domain::{EvalContext, NodeId, Ordinate, RollUp, StructuralTree};
use crate::infrastructure::di::{LoadedDocument, ServiceContainer};
use crate::infrastructure::InfraError;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    match &cli.command {
        Some(Commands::Tree { doc }) => cmd_tree(doc),
        Some(Commands::Headers { doc, lang, role, raw }) => cmd_headers(doc, lang.as_deref(), role.as_deref(), *raw),
        Some(Commands::Aspects { doc }) => cmd_aspects(doc),
        Some(Commands::Size { doc }) => cmd_size(doc),
        Some(Commands::Config { command }) => cmd_config(command),
        Some(Commands::Completion { shell }) => {
            let mut cmd = Cli::command();
            generate(*shell, &mut cmd, "rendr", &mut io::stdout());
            Ok(())
        }
        None => Err(CliError::Usage("no command given, see --help".to_string())),
    }
}

fn open(args: &DocumentArgs) -> CliResult<LoadedDocument> {
    let settings = Settings::load(args.document.parent())?;
    debug!("settings: {:?}", settings);
    let container = ServiceContainer::new(settings);
    Ok(container.load_document(&args.document)?)
}

/// Build every selected table and hand each axis root to `render`.
fn render_tables(
    args: &DocumentArgs,
    mut render: impl FnMut(&LoadedDocument, &StructuralTree, Ordinate, NodeId) -> CliResult<()>,
) -> CliResult<()> {
    let loaded = open(args)?;
    for table in loaded.tables(args.table.as_deref())? {
        let (mut tree, axes) = loaded.build(table)?;
        select_z_choice(&mut tree, &axes, args.z_choice)?;
        output::header(&format!("table {}", loaded.model.node(table)?.id));
        for ordinate in [Ordinate::X, Ordinate::Y, Ordinate::Z] {
            for &root in axes.axis(ordinate) {
                render(&loaded, &tree, ordinate, root)?;
            }
        }
    }
    Ok(())
}

fn select_z_choice(tree: &mut StructuralTree, axes: &TableAxes, index: usize) -> CliResult<()> {
    let owners: Vec<NodeId> = axes
        .z
        .iter()
        .flat_map(|&root| tree.iter(root))
        .filter(|(_, node)| !node.choices.is_empty())
        .map(|(idx, _)| idx)
        .collect();
    for owner in owners {
        tree.select_choice(owner, index)
            .map_err(|e| CliError::InvalidArgs(e.to_string()))?;
    }
    Ok(())
}

fn node_label(loaded: &LoadedDocument, tree: &StructuralTree, idx: NodeId) -> String {
    let Some(node) = tree.get_node(idx) else {
        return format!("{:?}", idx);
    };
    let Some(def) = loaded.model.get(node.definition) else {
        return format!("{:?}", idx);
    };
    let mut label = format!("{} {}", def.kind.name(), def.id);
    if def.is_merged() {
        label.push_str(" [merge]");
    }
    for (aspect, value) in &node.aspects {
        label.push_str(&format!(" {}={}", aspect, value));
    }
    for (name, value) in &node.variables {
        label.push_str(&format!(" ${}={}", name, value));
    }
    if let Some(fact) = &node.context_fact {
        label.push_str(&format!(" fact={}", fact));
    }
    if node.subtree_roll_up != RollUp::NotAnalyzed {
        label.push_str(&format!(" ({})", node.subtree_roll_up));
    }
    label
}

#[instrument]
fn cmd_tree(args: &DocumentArgs) -> CliResult<()> {
    render_tables(args, |loaded, tree, ordinate, root| {
        output::field(0, "axis", &ordinate);
        output::info(&tree.to_tree(root, &|idx| node_label(loaded, tree, idx)));
        Ok(())
    })
}

#[instrument]
fn cmd_headers(args: &DocumentArgs, lang: Option<&str>, role: Option<&str>, raw: bool) -> CliResult<()> {
    let mut request = HeaderRequest::default();
    if let Some(lang) = lang {
        request = request.with_lang(lang);
    }
    if let Some(role) = role {
        request = request.with_role(role);
    }
    if raw {
        request = request.unevaluated();
    }
    render_tables(args, |loaded, tree, ordinate, root| {
        output::field(0, "axis", &ordinate);
        let pass = loaded.pass(tree);
        let mut ctx = EvalContext::new();
        for (idx, node) in tree.iter(root) {
            let header = pass.header(&mut ctx, idx, request)?;
            output::entry(node.depth + 1, header.as_deref());
        }
        Ok(())
    })
}

#[instrument]
fn cmd_aspects(args: &DocumentArgs) -> CliResult<()> {
    render_tables(args, |loaded, tree, ordinate, root| {
        output::field(0, "axis", &ordinate);
        let pass = loaded.pass(tree);
        let mut ctx = EvalContext::new();
        for leaf in tree.leaf_nodes(root) {
            output::entry(1, Some(&node_label(loaded, tree, leaf)));
            for (aspect, value) in pass.resolved_aspects(&mut ctx, leaf)? {
                output::field(2, &aspect.to_string(), &value);
            }
        }
        Ok(())
    })
}

#[instrument]
fn cmd_size(args: &DocumentArgs) -> CliResult<()> {
    render_tables(args, |loaded, tree, ordinate, root| {
        output::field(0, "axis", &ordinate);
        let pass = loaded.pass(tree);
        let mut ctx = EvalContext::new();
        for (idx, node) in tree.iter(root) {
            let (cardinality, depth) = pass.cardinality_and_depth(&mut ctx, idx)?;
            let line = format!("{} [{}x{}]", node_label(loaded, tree, idx), cardinality, depth);
            output::entry(node.depth + 1, Some(&line));
        }
        Ok(())
    })
}

fn cmd_config(command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show { dir } => {
            let settings = Settings::load(dir.as_deref())?;
            output::info(&settings.to_toml()?);
            Ok(())
        }
        ConfigCommands::Init { global, dir } => {
            let path = if *global {
                global_config_path().ok_or_else(|| CliError::Usage("cannot determine config dir".to_string()))?
            } else {
                let dir = dir.clone().unwrap_or_else(|| PathBuf::from("."));
                local_config_path(&dir)
            };
            write_template(&path)
        }
        ConfigCommands::Path => {
            match global_config_path() {
                Some(path) => output::field(0, "global", &path.display()),
                None => output::field(0, "global", "-"),
            }
            output::field(0, "local", &local_config_path(Path::new("<document_dir>")).display());
            Ok(())
        }
    }
}

fn write_template(path: &Path) -> CliResult<()> {
    if path.exists() {
        output::warning(&format!("config already exists: {}", path.display()));
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| InfraError::io(format!("create {}", parent.display()), e))?;
    }
    std::fs::write(path, Settings::template())
        .map_err(|e| InfraError::io(format!("write {}", path.display()), e))?;
    output::action("Created", &path.display());
    Ok(())
}
