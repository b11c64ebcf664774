use crate::bundle::UpdateContent;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Pinned reference of one compose app inside a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRef {
    pub uri: String,
}

/// Read-only view of a signed TUF target: one OSTree commit plus the
/// compose apps shipped with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    /// OSTree commit this target boots.
    pub sha256: String,
    pub hardware_ids: Vec<String>,
    pub version: String,
    pub apps: BTreeMap<String, AppRef>,
}

impl Target {
    pub fn new(
        name: impl Into<String>,
        sha256: impl Into<String>,
        hardware_ids: Vec<String>,
        version: impl Into<String>,
        apps: BTreeMap<String, AppRef>,
    ) -> Self {
        Self {
            name: name.into(),
            sha256: sha256.into(),
            hardware_ids,
            version: version.into(),
            apps,
        }
    }
}

/// Version-aware string order: runs of digits compare numerically, the
/// rest byte-wise.
pub(crate) fn version_cmp(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            let run_a = digit_run(a, &mut i);
            let run_b = digit_run(b, &mut j);
            let ord = compare_digit_runs(run_a, run_b);
            if ord != Ordering::Equal {
                return ord;
            }
        } else {
            if a[i] != b[j] {
                return a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }
    }
    (a.len() - i).cmp(&(b.len() - j))
}

fn digit_run<'a>(s: &'a [u8], pos: &mut usize) -> &'a [u8] {
    let start = *pos;
    while *pos < s.len() && s[*pos].is_ascii_digit() {
        *pos += 1;
    }
    &s[start..*pos]
}

fn compare_digit_runs(a: &[u8], b: &[u8]) -> Ordering {
    let strip = |s: &[u8]| {
        let nz = s.iter().position(|c| *c != b'0').unwrap_or(s.len());
        s[nz..].to_vec()
    };
    let (a, b) = (strip(a), strip(b));
    a.len().cmp(&b.len()).then_with(|| a.cmp(&b))
}

/// Look a target up by its exact name.
pub fn find_target<'a>(targets: &'a [Target], name: &str) -> Option<&'a Target> {
    targets.iter().find(|t| t.name == name)
}

/// Pick the target the update medium satisfies.
///
/// Candidates must name the device's hardware id (and only it) and are
/// tried highest version first. A candidate is accepted when its commit is
/// present among the medium's ostree refs and every app found on the
/// medium belongs to it; target apps missing from the medium were dropped
/// during bundle assembly and are shortlisted away. The returned target
/// carries the shortlisted app map.
pub fn select_target(
    targets: &[Target],
    hardware_id: &str,
    content: &UpdateContent,
) -> Option<Target> {
    let mut candidates: Vec<&Target> = Vec::new();
    for target in targets {
        if target.hardware_ids.len() != 1 {
            log::warn!(
                "invalid hardware id count in target {}: found {}, expected 1",
                target.name,
                target.hardware_ids.len()
            );
            continue;
        }
        if target.hardware_ids[0] != hardware_id {
            log::debug!(
                "target {} hardware id {} does not match device hardware id {}, skipping",
                target.name,
                target.hardware_ids[0],
                hardware_id
            );
            continue;
        }
        log::debug!("found target: {}", target.name);
        candidates.push(target);
    }
    candidates.sort_by(|a, b| version_cmp(&b.version, &a.version));

    for candidate in candidates {
        log::info!(
            "checking if update content matches the given target: {}",
            candidate.name
        );
        if !content.ostree_commits.contains(&candidate.sha256) {
            log::debug!("no ostree commit found for target: {}", candidate.name);
            continue;
        }

        let mut pending: Vec<&str> = content.app_uris.iter().map(String::as_str).collect();
        let mut shortlist = candidate.apps.clone();
        for (name, app) in &candidate.apps {
            match pending.iter().position(|uri| *uri == app.uri) {
                Some(found) => {
                    pending.remove(found);
                }
                None => {
                    // dropped while the bundle was assembled; tolerated
                    log::debug!(
                        "no app found for target {}; app: {}",
                        candidate.name,
                        app.uri
                    );
                    shortlist.remove(name);
                }
            }
        }

        // every app present on the medium is accounted for by this target
        if pending.is_empty() {
            return Some(Target {
                apps: shortlist,
                ..candidate.clone()
            });
        }
    }
    None
}
