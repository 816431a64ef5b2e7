use async_glfs::types::file::FileType;
use async_glfs::Session;
use memvol::MemVolume;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use structopt::StructOpt;
use tracing::debug;

#[derive(Debug, StructOpt)]
#[structopt(about = "Builds a tree in an in-memory volume and lists it")]
struct Args {
    #[structopt(long, default_value = "memvol", help = "The volume name")]
    name: String,

    #[structopt(long, default_value = "131072", help = "The readdir batch size in bytes")]
    readdir_batch: usize,

    #[structopt(long, help = "Text written to every created file")]
    content: Option<String>,

    #[structopt(
        name = "PATHS",
        help = "Paths to create. A trailing '/' creates a directory"
    )]
    paths: Vec<PathBuf>,
}

fn setup_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_timer(fmt::time::ChronoLocal::rfc_3339())
        .finish()
        .with(ErrorLayer::default())
        .init();
}

fn main() -> Result<()> {
    setup_tracing();
    let args = Args::from_args();
    async_std::task::block_on(run(args))?;
    Ok(())
}

#[allow(clippy::unit_arg)]
#[tracing::instrument(err)]
async fn run(args: Args) -> Result<()> {
    let volume = Arc::new(MemVolume::new(&args.name));
    let session = Session::builder()
        .readdir_batch(args.readdir_batch)
        .subvol(volume)
        .build();

    for path in &args.paths {
        let abs = Path::new("/").join(path);
        if path.to_string_lossy().ends_with('/') {
            create_dirs(&session, &abs).await?;
        } else {
            if let Some(parent) = abs.parent() {
                create_dirs(&session, parent).await?;
            }
            let fd = session
                .creat(&abs, libc::O_WRONLY | libc::O_TRUNC, 0o644)
                .await
                .with_context(|| format!("failed to create {}", abs.display()))?;
            if let Some(ref content) = args.content {
                let _ = fd.write(content.as_bytes(), 0).await?;
            }
            fd.close().await?;
        }
        debug!(path = %abs.display(), "created");
    }

    list(&session, Path::new("/")).await
}

/// `mkdir -p`
async fn create_dirs(session: &Session, path: &Path) -> Result<()> {
    let mut cur = PathBuf::from("/");
    for comp in path.components().skip(1) {
        cur.push(comp);
        match session.stat(&cur).await {
            Ok(_) => continue,
            Err(errno) if errno.as_raw() == libc::ENOENT => session
                .mkdir(&cur, 0o755)
                .await
                .with_context(|| format!("failed to create {}", cur.display()))?,
            Err(errno) => return Err(errno.into()),
        }
    }
    Ok(())
}

/// Prints the tree under `root`, depth first
async fn list(session: &Session, root: &Path) -> Result<()> {
    println!("/");
    let mut stack = vec![(root.to_owned(), FileType::Directory, 0_usize)];
    while let Some((path, d_type, depth)) = stack.pop() {
        if depth > 0 {
            let indent = "  ".repeat(depth);
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            match d_type {
                FileType::Directory => println!("{}{}/", indent, name),
                FileType::SymbolicLink => {
                    let mut buf = [0_u8; 4096];
                    let len = session.readlink(&path, &mut buf).await?;
                    println!("{}{} -> {}", indent, name, String::from_utf8_lossy(&buf[..len]));
                }
                _ => {
                    let stat = session.lstat(&path).await?;
                    println!("{}{} ({} bytes)", indent, name, stat.st_size);
                }
            }
        }
        if d_type != FileType::Directory {
            continue;
        }

        let mut dirfd = session.opendir(&path).await?;
        let mut children = Vec::new();
        while let Some(dirent) = dirfd.readdir().await? {
            let name = dirent.name();
            if name == "." || name == ".." {
                continue;
            }
            children.push((path.join(name), dirent.d_type, depth.wrapping_add(1)));
        }
        dirfd.closedir();
        stack.extend(children.into_iter().rev());
    }
    Ok(())
}
