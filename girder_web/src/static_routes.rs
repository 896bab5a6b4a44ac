use axum::Router;
use std::io;
use std::path::Path;
use tower_http::services::{ServeDir, ServeFile};
use tracing::debug;

const FAVICONS_DIR: &str = "favicons";

/// Serves the files of `dir` under `/static`, and each file of
/// `dir/favicons` at the site root.
///
/// A missing `favicons` directory is not an error.
pub fn static_routes<S>(dir: impl AsRef<Path>) -> io::Result<Router<S>>
where
    S: Clone + Send + Sync + 'static,
{
    let dir = dir.as_ref();
    let mut router = Router::new().nest_service("/static", ServeDir::new(dir));

    let favicons = dir.join(FAVICONS_DIR);
    if !favicons.is_dir() {
        return Ok(router);
    }

    for entry in favicons.read_dir()? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };

        debug!(name = name, "Serving favicon");
        router = router.route_service(&format!("/{name}"), ServeFile::new(entry.path()));
    }

    Ok(router)
}
