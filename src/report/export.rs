use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};
use tracing::info;

use crate::error::AppResult;
use crate::workspace::Workspace;

/// Bundles the collected result files of the given cycles into one
/// gzipped tar, one `SEQUENCE-<id>/` directory per cycle.
pub fn export_bundle(
    workspace: &Workspace,
    cycle_ids: &[i64],
    out_path: &Path,
) -> AppResult<PathBuf> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(out_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    for cycle_id in cycle_ids {
        let cycle_dir = workspace.cycle_dir(*cycle_id);
        if !cycle_dir.is_dir() {
            continue;
        }
        for entry in std::fs::read_dir(&cycle_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("jtl") {
                continue;
            }
            let archive_path = format!(
                "SEQUENCE-{}/{}",
                cycle_id,
                entry.file_name().to_string_lossy()
            );
            builder.append_path_with_name(&path, archive_path)?;
        }
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;
    info!(bundle = %out_path.display(), "results exported");
    Ok(out_path.to_owned())
}

/// Unpacks a result bundle (or accepts a bare .jtl file) into `dest_dir`
/// and returns the extracted .jtl paths.
pub fn import_bundle(archive: &Path, dest_dir: &Path) -> AppResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dest_dir)?;

    if archive.extension().and_then(|ext| ext.to_str()) == Some("jtl") {
        let dest = dest_dir.join(archive.file_name().unwrap_or_default());
        std::fs::copy(archive, &dest)?;
        return Ok(vec![dest]);
    }

    let file = File::open(archive)?;
    let mut unpacked = Archive::new(GzDecoder::new(file));
    let mut imported = Vec::new();
    for entry in unpacked.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        if entry_path.extension().and_then(|ext| ext.to_str()) != Some("jtl") {
            continue;
        }
        let file_name = entry_path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        let dest = dest_dir.join(file_name);
        entry.unpack(&dest)?;
        imported.push(dest);
    }
    imported.sort();
    Ok(imported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_then_import_round_trips_the_jtl_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(dir.path(), "shop");
        workspace.create().expect("workspace");
        let cycle_dir = workspace.create_cycle_dir(1).expect("cycle dir");
        std::fs::write(cycle_dir.join("a.jtl"), "timeStamp,elapsed,label,success\n")
            .expect("write");
        std::fs::write(cycle_dir.join("notes.txt"), "ignored").expect("write");

        let bundle = workspace.reports_dir().join("export.tar.gz");
        export_bundle(&workspace, &[1], &bundle).expect("export");
        assert!(bundle.is_file());

        let import_dir = dir.path().join("incoming");
        let imported = import_bundle(&bundle, &import_dir).expect("import");
        assert_eq!(imported.len(), 1);
        let content = std::fs::read_to_string(&imported[0]).expect("read");
        assert_eq!(content, "timeStamp,elapsed,label,success\n");
    }

    #[test]
    fn bare_jtl_files_import_directly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let external = dir.path().join("external.jtl");
        std::fs::write(&external, "timeStamp,elapsed,label,success\n").expect("write");

        let import_dir = dir.path().join("incoming");
        let imported = import_bundle(&external, &import_dir).expect("import");
        assert_eq!(imported.len(), 1);
        assert!(imported[0].ends_with("external.jtl"));
    }

    #[test]
    fn missing_cycle_dirs_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(dir.path(), "shop");
        workspace.create().expect("workspace");
        let bundle = workspace.reports_dir().join("empty.tar.gz");
        export_bundle(&workspace, &[41, 42], &bundle).expect("export");
        assert!(bundle.is_file());
    }
}
