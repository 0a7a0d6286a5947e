use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::info;

use tagstore::find::{Finder, SourceFile};
use tagstore::indexer::Indexer;

use super::Workspace;

pub fn build_tags(ws: Workspace, file_list: Option<PathBuf>, quiet: bool) -> Result<()> {
    std::fs::create_dir_all(&ws.dbpath)
        .with_context(|| format!("cannot create {}", ws.dbpath.display()))?;

    let files: Vec<SourceFile> = match &file_list {
        Some(list) => {
            let reader = BufReader::new(
                File::open(list).with_context(|| format!("cannot open file list {}", list.display()))?,
            );
            Finder::from_filelist(reader, &ws.root, &ws.config.sources)?.collect()
        }
        None => Finder::from_tree(&ws.root, &ws.config.sources)
            .with_context(|| format!("cannot walk {}", ws.root.display()))?
            .collect(),
    };
    info!("Found {} files under {}", files.len(), ws.root.display());

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {wide_msg}")?
                .progress_chars("=> "),
        );
        bar
    };

    let indexer = Indexer::new(&ws.root, &ws.dbpath, ws.config);
    let stats = indexer.build(&files, &progress).context("build failed")?;
    progress.finish_and_clear();

    if !quiet {
        println!("Files:       {} ({} sources)", stats.files, stats.sources);
        println!("Definitions: {}", stats.definitions);
        println!("References:  {}", stats.references);
        println!("Symbols:     {}", stats.symbols);
    }

    Ok(())
}
