// ABOUTME: Single-file tar packing for uploads into a container
// Splits a target path into the extraction directory and the archive entry name

use anyhow::{Context, Result};
use std::path::Path;
use tar::{Builder, Header};
use tokio::io::{AsyncRead, AsyncReadExt};

/// A file ready to be extracted in a container directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArchive {
    /// Directory the archive is extracted into
    pub directory: String,
    pub bytes: Vec<u8>,
}

/// Read `content` fully and pack it as the single entry `basename(path)`.
pub async fn pack_file<R>(path: &str, mut content: R) -> Result<FileArchive>
where
    R: AsyncRead + Unpin,
{
    let (directory, name) = split_target(path)?;

    let mut buffer = Vec::new();
    content
        .read_to_end(&mut buffer)
        .await
        .with_context(|| format!("Failed to read content for {}", path))?;

    let mut bytes = Vec::new();
    {
        let mut tar_builder = Builder::new(&mut bytes);
        let mut header = Header::new_gnu();
        header.set_path(&name)?;
        header.set_size(buffer.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar_builder.append(&header, buffer.as_slice())?;
        tar_builder.finish()?;
    }

    Ok(FileArchive { directory, bytes })
}

fn split_target(path: &str) -> Result<(String, String)> {
    let target = Path::new(path);
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("No file name in {}", path))?;
    let directory = match target.parent().and_then(|p| p.to_str()) {
        Some("") | None => ".",
        Some(dir) => dir,
    };
    Ok((directory.to_string(), name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[tokio::test]
    async fn test_pack_file_uses_basename_and_parent() {
        let archive = pack_file("/root/notes/todo.txt", &b"buy milk\n"[..]).await.unwrap();
        assert_eq!(archive.directory, "/root/notes");

        let mut tar = tar::Archive::new(archive.bytes.as_slice());
        let mut entries = tar.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        assert_eq!(entry.path().unwrap().to_str(), Some("todo.txt"));
        assert_eq!(entry.header().size().unwrap(), 9);
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, "buy milk\n");
        assert!(entries.next().is_none());
    }

    #[tokio::test]
    async fn test_relative_and_invalid_targets() {
        let archive = pack_file("todo.txt", &b""[..]).await.unwrap();
        assert_eq!(archive.directory, ".");

        assert!(pack_file("/", &b""[..]).await.is_err());
    }
}
