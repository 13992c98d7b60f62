//! Atomic snapshot persistence: write-to-temp + rename, never mutate the
//! target file in place (spec §9 "Snapshot atomicity"). The dispatcher's
//! command loop calls these between commands, never during one — matching
//! spec §5's "no I/O waits inside a command" rule.

use std::path::Path;

use tracing::{info, warn};

use crate::engine::EngineSnapshot;

pub async fn write(path: &str, snapshot: &EngineSnapshot) -> anyhow::Result<()> {
    let target = Path::new(path);
    if let Some(dir) = target.parent() {
        if !dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(dir).await?;
        }
    }

    let tmp_path = target.with_extension("tmp");
    let body = serde_json::to_vec_pretty(snapshot)?;
    tokio::fs::write(&tmp_path, &body).await?;
    tokio::fs::rename(&tmp_path, target).await?;
    info!(path = %path, "snapshot written");
    Ok(())
}

pub async fn load(path: &str) -> anyhow::Result<Option<EngineSnapshot>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(err) => {
                warn!(path = %path, error = %err, "snapshot incompatible, starting empty");
                Ok(None)
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}
