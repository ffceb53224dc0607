//! Owner-only directories and crash-safe file replacement.

use eyre::Context as _;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt as _, PermissionsExt as _};

pub const MODE_DIR_PRIVATE: u32 = 0o700;
pub const MODE_FILE_PRIVATE: u32 = 0o600;

fn refuse_symlink(p: &Path) -> eyre::Result<()> {
    let md = fs::symlink_metadata(p).with_context(|| format!("stat {}", p.display()))?;
    if md.file_type().is_symlink() {
        eyre::bail!("refusing to use symlink: {}", p.display());
    }
    Ok(())
}

/// Create `dir` if needed and clamp it to 0700 when group/other bits are set.
pub fn ensure_private_dir(dir: &Path) -> eyre::Result<()> {
    if dir.exists() {
        refuse_symlink(dir)?;
        if !dir.is_dir() {
            eyre::bail!("expected directory at {}", dir.display());
        }
    } else {
        fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
    }

    #[cfg(unix)]
    {
        let mode = fs::metadata(dir)
            .with_context(|| format!("stat {}", dir.display()))?
            .permissions()
            .mode();
        if mode & 0o077 != 0 {
            fs::set_permissions(dir, fs::Permissions::from_mode(MODE_DIR_PRIVATE))
                .with_context(|| format!("chmod {MODE_DIR_PRIVATE:o} {}", dir.display()))?;
        }
    }
    Ok(())
}

/// Replace `path` with `contents`: write a fresh owner-only temp file next to it, fsync, then
/// rename over the target.
pub fn write_private(path: &Path, contents: &[u8]) -> eyre::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| eyre::eyre!("missing parent for {}", path.display()))?;
    ensure_private_dir(parent)?;
    if path.exists() {
        refuse_symlink(path)?;
    }

    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let tmp = parent.join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()));

    let mut opts = OpenOptions::new();
    opts.create_new(true).write(true);
    #[cfg(unix)]
    opts.mode(MODE_FILE_PRIVATE);
    let mut f = opts
        .open(&tmp)
        .with_context(|| format!("open temp {}", tmp.display()))?;
    f.write_all(contents)
        .and_then(|()| f.sync_all())
        .with_context(|| format!("write {}", tmp.display()))?;
    drop(f);

    #[cfg(windows)]
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("remove {}", path.display()))?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))
}
