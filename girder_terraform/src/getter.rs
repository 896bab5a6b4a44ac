use crate::TerraformError;
use crate::TerraformModSrcType;
use crate::modules::relative_to;
use crate::source_type::{getter_source_type, split_forced_getter};
use std::io;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A git module source, split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GitSource {
    pub(crate) url: String,
    pub(crate) reference: Option<String>,
    pub(crate) depth: Option<u32>,
    pub(crate) subdir: Option<String>,
}

/// Parses a module source that the git getter can fetch.
///
/// Accepts `git::<url>`, the `github.com/`, `gitlab.com/` and
/// `bitbucket.org/` shorthands, and scp-style `user@host:path`. The `ref` and
/// `depth` query parameters and a `//subdir` suffix are split off. A `ref`
/// starting with `-` is rejected, as `git` would read it as an option.
pub(crate) fn parse_git_source(source: &str) -> Result<GitSource, TerraformError> {
    let unforced = match split_forced_getter(source) {
        Some(("git", rest)) => rest,
        Some((getter, _)) => return Err(TerraformError::UnsupportedGetter(getter.to_string())),
        None => match getter_source_type(source) {
            TerraformModSrcType::Git => source,
            other => return Err(TerraformError::UnsupportedGetter(other.to_string())),
        },
    };

    let (location, query) = match unforced.split_once('?') {
        Some((location, query)) => (location, query),
        None => (unforced, ""),
    };

    let (location, subdir) = split_subdir(location);

    let mut reference = None;
    let mut depth = None;
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        match pair.split_once('=') {
            Some(("ref", value)) if value.starts_with('-') => {
                return Err(TerraformError::InvalidGitRef(value.to_string()));
            }
            Some(("ref", value)) if !value.is_empty() => reference = Some(value.to_string()),
            Some(("depth", value)) => depth = value.parse().ok(),
            _ => warn!(source = source, parameter = pair, "Ignoring unsupported git source parameter"),
        }
    }

    Ok(GitSource {
        url: expand_shorthand(location),
        reference,
        depth,
        subdir,
    })
}

fn split_subdir(location: &str) -> (&str, Option<String>) {
    // The scheme separator is not a subdirectory marker
    let search_from = location.find("://").map_or(0, |index| index + 3);

    match location[search_from..].find("//") {
        Some(index) => {
            let (repository, subdir) = location.split_at(search_from + index);
            let subdir = subdir.trim_matches('/');

            (repository, (!subdir.is_empty()).then(|| subdir.to_string()))
        }
        None => (location, None),
    }
}

fn expand_shorthand(location: &str) -> String {
    let is_shorthand = ["github.com/", "gitlab.com/", "bitbucket.org/"]
        .iter()
        .any(|prefix| location.starts_with(prefix));

    if !is_shorthand {
        return location.to_string();
    }

    if location.ends_with(".git") {
        format!("https://{location}")
    } else {
        format!("https://{location}.git")
    }
}

/// Fails unless `destination` is missing or an empty directory.
pub(crate) async fn ensure_empty_destination(destination: &Path) -> Result<(), TerraformError> {
    let mut entries = match tokio::fs::read_dir(destination).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(_) if destination.exists() => {
            return Err(TerraformError::DestinationNotEmpty(destination.to_path_buf()));
        }
        Err(error) => return Err(error.into()),
    };

    if entries.next_entry().await?.is_some() {
        return Err(TerraformError::DestinationNotEmpty(destination.to_path_buf()));
    }

    Ok(())
}

/// Fetches the module `source` into `destination`.
pub(crate) async fn fetch(source: &str, destination: &Path) -> Result<(), TerraformError> {
    let git = parse_git_source(source)?;

    debug!(
        url = git.url.as_str(),
        reference = git.reference.as_deref(),
        subdir = git.subdir.as_deref(),
        destination = %destination.display(),
        "Fetching module source with git",
    );

    let Some(subdir) = &git.subdir else {
        return clone(&git, destination).await;
    };

    let checkout = staging_dir(destination);
    let result = async {
        clone(&git, &checkout).await?;

        let from = checkout.join(subdir);
        if !from.is_dir() {
            return Err(TerraformError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no directory '{subdir}' in module source"),
            )));
        }

        copy_dir(&from, destination).await
    }
    .await;

    if let Err(error) = tokio::fs::remove_dir_all(&checkout).await {
        warn!(
            ?error,
            error_message = %error,
            path = %checkout.display(),
            "Failed to remove the module checkout",
        );
    }

    result
}

fn staging_dir(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "module".to_string());

    destination.with_file_name(format!(".{name}.{}.checkout", std::process::id()))
}

async fn clone(git: &GitSource, destination: &Path) -> Result<(), TerraformError> {
    let mut args = vec!["clone".to_string()];
    if let Some(depth) = git.depth {
        args.push(format!("--depth={depth}"));
        if let Some(reference) = &git.reference {
            args.push(format!("--branch={reference}"));
        }
    }
    args.push("--".to_string());
    args.push(git.url.clone());
    args.push(destination.to_string_lossy().into_owned());

    run_git("clone", Command::new("git").args(&args)).await?;

    // A shallow clone already checked out the ref
    if let (Some(reference), None) = (&git.reference, git.depth) {
        run_git(
            "checkout",
            Command::new("git")
                .arg("-C")
                .arg(destination)
                .args(["checkout", reference.as_str()]),
        )
        .await?;
    }

    Ok(())
}

async fn run_git(command: &'static str, invocation: &mut Command) -> Result<(), TerraformError> {
    let output = invocation.output().await?;

    if !output.status.success() {
        return Err(TerraformError::Git {
            command,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}

async fn copy_dir(from: &Path, to: &Path) -> Result<(), TerraformError> {
    tokio::fs::create_dir_all(to).await?;

    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry?;
        let relative = relative_to(entry.path(), from)?;
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            tokio::fs::create_dir_all(&target).await?;
        } else {
            tokio::fs::copy(entry.path(), &target).await?;
        }
    }

    Ok(())
}
