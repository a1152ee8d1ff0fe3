use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Resolved locations of the known artifacts inside a dump directory.
#[derive(Debug, Clone, Default)]
pub struct DumpArtifacts {
    pub log: Option<PathBuf>,
    pub statistics: Option<PathBuf>,
    pub settings: Option<PathBuf>,
    pub omnichannel: Option<PathBuf>,
    pub apps: Option<PathBuf>,
}

/// Find the directory holding the dump artifacts anywhere under `base`.
/// The statistics artifact is the primary indicator; a log artifact
/// directly under `base` is the fallback.
pub fn find_dump_root(base: &Path) -> Option<PathBuf> {
    for entry in WalkDir::new(base).into_iter().filter_map(Result::ok) {
        if entry.file_type().is_file()
            && entry
                .file_name()
                .to_string_lossy()
                .ends_with("server-statistics.json")
        {
            return entry.path().parent().map(Path::to_path_buf);
        }
    }
    if find_file(base, "log.json").is_some() {
        return Some(base.to_path_buf());
    }
    None
}

/// Locate each known artifact by filename suffix, directly inside `dir`.
pub fn locate_artifacts(dir: &Path) -> DumpArtifacts {
    DumpArtifacts {
        log: find_file(dir, "log.json"),
        statistics: find_file(dir, "server-statistics.json"),
        settings: find_settings_file(dir),
        omnichannel: find_file(dir, "omnichannel-settings.json"),
        apps: find_file(dir, "apps-installed.json"),
    }
}

/// First file in `dir` whose name ends with `suffix`, in lexicographic
/// order for determinism.
fn find_file(dir: &Path, suffix: &str) -> Option<PathBuf> {
    sorted_files(dir)
        .into_iter()
        .find(|path| file_name_of(path).ends_with(suffix))
}

/// The main settings artifact is any `*settings.json` that is not the
/// omnichannel one.
fn find_settings_file(dir: &Path) -> Option<PathBuf> {
    sorted_files(dir).into_iter().find(|path| {
        let name = file_name_of(path);
        name.ends_with("settings.json") && !name.to_lowercase().contains("omnichannel")
    })
}

fn sorted_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
