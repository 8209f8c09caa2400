//! Locates BLAST databases under `<root>/<group>/<release>/.../<dir>/<base>.<ext>`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

use crate::domain::{ArtifactHandle, MoleculeType};
use crate::error::ValidatorError;
use crate::fs_util;

/// Release assigned to databases that sit directly inside a group directory.
pub const UNVERSIONED_RELEASE: &str = "unversioned";

#[derive(Debug, Clone, Default)]
pub struct DiscoveryFilter {
    pub groups: Vec<String>,
    pub release: Option<String>,
}

impl DiscoveryFilter {
    pub fn group(group: impl Into<String>) -> Self {
        Self {
            groups: vec![group.into()],
            release: None,
        }
    }

    fn accepts_release(&self, release: &str) -> bool {
        self.release
            .as_deref()
            .map(|wanted| wanted == release)
            .unwrap_or(true)
    }
}

pub type DiscoveredHandles = BTreeMap<String, Vec<ArtifactHandle>>;

/// Discover every database below `root`, optionally limited to one group.
pub fn discover(
    root: &Utf8Path,
    group_filter: Option<&str>,
) -> Result<DiscoveredHandles, ValidatorError> {
    let filter = match group_filter {
        Some(group) => DiscoveryFilter::group(group),
        None => DiscoveryFilter::default(),
    };
    discover_with(root, &filter)
}

pub fn discover_with(
    root: &Utf8Path,
    filter: &DiscoveryFilter,
) -> Result<DiscoveredHandles, ValidatorError> {
    if !root.as_std_path().is_dir() {
        return Err(ValidatorError::RootNotFound(root.to_path_buf()));
    }

    let group_dirs = if filter.groups.is_empty() {
        fs_util::subdirectories(root.as_std_path())?
            .into_iter()
            .filter_map(|path| Utf8PathBuf::from_path_buf(path).ok())
            .collect::<Vec<_>>()
    } else {
        filter
            .groups
            .iter()
            .map(|group| validate_group(group).map(|group| root.join(group)))
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut discovered = DiscoveredHandles::new();
    for group_dir in group_dirs {
        let Some(group) = group_dir.file_name().map(str::to_string) else {
            continue;
        };
        let handles = if group_dir.as_std_path().is_dir() {
            discover_group(&group_dir, &group, filter)
        } else {
            debug!(group = %group, "group directory absent");
            Vec::new()
        };
        discovered.entry(group).or_default().extend(handles);
    }
    Ok(discovered)
}

fn discover_group(
    group_dir: &Utf8Path,
    group: &str,
    filter: &DiscoveryFilter,
) -> Vec<ArtifactHandle> {
    let mut seen = BTreeSet::new();
    let mut handles = Vec::new();

    // Nucleotide markers first so a shared base path resolves to nucleotide.
    let mut markers = fs_util::walk_files(group_dir.as_std_path())
        .into_iter()
        .filter_map(|path| marker_of(&path).map(|molecule_type| (molecule_type, path)))
        .collect::<Vec<_>>();
    markers.sort();

    for (molecule_type, marker) in markers {
        let Ok(marker) = Utf8PathBuf::from_path_buf(marker) else {
            warn!(group = %group, "skipping non-utf8 database path");
            continue;
        };
        let Some(handle) = handle_from_marker(group_dir, group, &marker, molecule_type) else {
            continue;
        };
        if !filter.accepts_release(&handle.release) {
            continue;
        }
        if seen.insert(handle.path.clone()) {
            handles.push(handle);
        }
    }
    handles
}

/// A group filter names one directory directly under the root.
fn validate_group(group: &str) -> Result<&str, ValidatorError> {
    let mut components = Utf8Path::new(group).components();
    match (components.next(), components.next()) {
        (Some(Utf8Component::Normal(name)), None) if name == group => Ok(group),
        _ => Err(ValidatorError::InvalidGroup(group.to_string())),
    }
}

fn marker_of(path: &Path) -> Option<MoleculeType> {
    let ext = path.extension()?.to_str()?;
    MoleculeType::from_marker(ext)
}

fn handle_from_marker(
    group_dir: &Utf8Path,
    group: &str,
    marker: &Utf8Path,
    molecule_type: MoleculeType,
) -> Option<ArtifactHandle> {
    let path = marker.with_extension("");
    let parent = marker.parent()?;
    let relative = parent.strip_prefix(group_dir).ok()?;
    let release = relative
        .components()
        .next()
        .map(|component| component.as_str().to_string())
        .unwrap_or_else(|| UNVERSIONED_RELEASE.to_string());
    let name = parent
        .file_name()
        .map(str::to_string)
        .or_else(|| path.file_name().map(str::to_string))?;
    Some(ArtifactHandle {
        name,
        path,
        molecule_type,
        group: group.to_string(),
        release,
    })
}
