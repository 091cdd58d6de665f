//! `file_store`: read, write, or append files under the storage directory.
//!
//! `path` must be relative and may not contain `..`. Symlinks are resolved
//! before any I/O, so a link inside the root cannot lead outside it.

use std::path::{Component, Path, PathBuf};

use dagflow_core::workflow::expression::render;
use dagflow_core::workflow::node::{optional_str, require_str};
use dagflow_core::{ExecutionContext, Node, NodeError, NodeFuture};
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;

pub struct FileStoreNode {
    root: PathBuf,
}

impl FileStoreNode {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Join `relative` onto the root, rejecting escapes.
    fn resolve(&self, relative: &str) -> Result<PathBuf, NodeError> {
        let path = Path::new(relative);
        if relative.is_empty() {
            return Err(NodeError::invalid_config("'path' must not be empty"));
        }
        for component in path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(NodeError::invalid_config(format!(
                        "path '{relative}' escapes the storage directory"
                    )));
                }
            }
        }
        Ok(self.root.join(path))
    }

    /// Resolve the deepest existing part of `path` through any symlinks and
    /// require it to stay under the canonical root.
    async fn confine(&self, path: &Path, relative: &str) -> Result<(), NodeError> {
        let escape = || NodeError::failed(format!("path '{relative}' escapes the storage directory"));
        let root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|e| NodeError::failed(format!("storage directory unavailable: {e}")))?;

        let mut probe = path.to_path_buf();
        loop {
            if tokio::fs::symlink_metadata(&probe).await.is_ok() {
                // A dangling link fails to canonicalize.
                let real = tokio::fs::canonicalize(&probe).await.map_err(|_| escape())?;
                return if real.starts_with(&root) { Ok(()) } else { Err(escape()) };
            }
            if !probe.pop() {
                return Err(escape());
            }
        }
    }
}

impl Node for FileStoreNode {
    fn execute<'a>(&'a self, config: Value, ctx: &'a ExecutionContext) -> NodeFuture<'a> {
        Box::pin(async move {
            let operation = optional_str(&config, "operation")?.unwrap_or("write");
            let relative = require_str(&config, "path")?;
            let path = self.resolve(relative)?;
            let io_err = |e: std::io::Error| NodeError::failed(format!("{operation} '{relative}': {e}"));

            let result = match operation {
                "read" => {
                    self.confine(&path, relative).await?;
                    let content = tokio::fs::read_to_string(&path).await.map_err(io_err)?;
                    json!({ "path": relative, "content": content })
                }
                "write" | "append" => {
                    let content = match config.get("content") {
                        Some(value) => render(value),
                        None => return Err(NodeError::invalid_config("missing required field 'content'")),
                    };
                    tokio::fs::create_dir_all(&self.root).await.map_err(io_err)?;
                    self.confine(&path, relative).await?;
                    if let Some(parent) = path.parent() {
                        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
                    }
                    let mut file = tokio::fs::OpenOptions::new()
                        .create(true)
                        .write(true)
                        .append(operation == "append")
                        .truncate(operation == "write")
                        .open(&path)
                        .await
                        .map_err(io_err)?;
                    file.write_all(content.as_bytes()).await.map_err(io_err)?;
                    file.flush().await.map_err(io_err)?;
                    json!({ "path": relative, "bytes": content.len() })
                }
                other => {
                    return Err(NodeError::invalid_config(format!(
                        "unknown operation '{other}' (expected read, write, or append)"
                    )));
                }
            };

            tracing::debug!(run_id = ctx.run_id(), operation, path = relative, "file_store completed");
            Ok(result)
        })
    }
}
