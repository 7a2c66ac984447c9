//! Gzip-compressed tar archives.

use super::Archiver;
use crate::archive::components::PackEntry;
use crate::utils::errors::ToolResult;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::path::Path;

pub struct TarGzArchiver;

impl Archiver for TarGzArchiver {
    fn pack(&self, entries: &[PackEntry], out: &mut dyn Write) -> ToolResult<()> {
        let encoder = GzEncoder::new(out, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);

        for entry in entries {
            if entry.is_dir {
                builder.append_dir_all(&entry.name, &entry.source)?;
            } else {
                builder.append_path_with_name(&entry.source, &entry.name)?;
            }
        }

        // Finish and flush the archive before the caller touches the stream
        let encoder = builder.into_inner()?;
        encoder.finish()?.flush()?;
        Ok(())
    }

    fn unpack(&self, input: &mut dyn Read, dest: &Path) -> ToolResult<()> {
        std::fs::create_dir_all(dest)?;
        let mut archive = tar::Archive::new(GzDecoder::new(input));
        archive.set_preserve_permissions(true);
        archive.unpack(dest)?;
        Ok(())
    }
}
