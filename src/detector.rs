use crate::models::{ManifestDescriptor, RepositoryRef, TreeEntry};

/// Picks dependency manifests out of a repository tree.
///
/// An entry is a manifest when its basename is exactly one of the recognized
/// filenames; depth and near-miss names (`requirements.txt.bak`) do not
/// matter. Output order follows the tree.
#[derive(Debug, Clone)]
pub struct ManifestFilter {
    recognized: Vec<String>,
    raw_base: String,
    branch: String,
}

impl ManifestFilter {
    pub fn new(recognized: Vec<String>, raw_base: &str, branch: &str) -> Self {
        ManifestFilter {
            recognized,
            raw_base: raw_base.trim_end_matches('/').to_string(),
            branch: branch.to_string(),
        }
    }

    pub fn filter(&self, entries: &[TreeEntry], repo: &RepositoryRef) -> Vec<ManifestDescriptor> {
        entries
            .iter()
            .filter(|e| !e.is_directory())
            .filter_map(|e| self.describe(e, repo))
            .collect()
    }

    fn describe(&self, entry: &TreeEntry, repo: &RepositoryRef) -> Option<ManifestDescriptor> {
        let (dirpath, filename) = match entry.path.rsplit_once('/') {
            Some((dir, file)) => (dir, file),
            None => ("", entry.path.as_str()),
        };

        if !self.recognized.iter().any(|r| r == filename) {
            return None;
        }

        Some(ManifestDescriptor {
            filename: filename.to_string(),
            download_url: format!(
                "{}/{}/{}/{}/{}",
                self.raw_base, repo.owner, repo.name, self.branch, entry.path
            ),
            dirpath: dirpath.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> ManifestFilter {
        ManifestFilter::new(
            vec![
                "pom.xml".to_string(),
                "package.json".to_string(),
                "requirements.txt".to_string(),
            ],
            "https://raw.githubusercontent.com",
            "master",
        )
    }

    fn repo() -> RepositoryRef {
        RepositoryRef {
            owner: "acme".to_string(),
            name: "widget".to_string(),
        }
    }

    fn blob(path: &str) -> TreeEntry {
        TreeEntry {
            path: path.to_string(),
            sha: format!("sha-{path}"),
            kind: Some("blob".to_string()),
        }
    }

    #[test]
    fn test_keeps_recognized_in_tree_order() {
        let entries = vec![blob("a/pom.xml"), blob("b/notes.txt"), blob("c/package.json")];
        let found = filter().filter(&entries, &repo());

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].filename, "pom.xml");
        assert_eq!(found[0].dirpath, "a");
        assert_eq!(found[1].filename, "package.json");
        assert_eq!(found[1].dirpath, "c");
    }

    #[test]
    fn test_root_manifest_download_url() {
        let found = filter().filter(&[blob("pom.xml")], &repo());

        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].download_url,
            "https://raw.githubusercontent.com/acme/widget/master/pom.xml"
        );
        assert_eq!(found[0].dirpath, "");
    }

    #[test]
    fn test_near_miss_names_are_excluded() {
        let entries = vec![
            blob("requirements.txt.bak"),
            blob("deep/nested/dir/requirements.txt"),
            blob("old-pom.xml"),
            blob("Package.json"),
            blob("docs/package.json.md"),
        ];
        let found = filter().filter(&entries, &repo());

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].filename, "requirements.txt");
        assert_eq!(found[0].dirpath, "deep/nested/dir");
        assert_eq!(
            found[0].download_url,
            "https://raw.githubusercontent.com/acme/widget/master/deep/nested/dir/requirements.txt"
        );
    }

    #[test]
    fn test_directories_are_skipped() {
        let dir = TreeEntry {
            path: "pom.xml".to_string(),
            sha: "d".to_string(),
            kind: Some("tree".to_string()),
        };
        assert!(filter().filter(&[dir], &repo()).is_empty());
    }

    #[test]
    fn test_same_tree_gives_same_descriptors() {
        let entries = vec![blob("pom.xml"), blob("web/package.json")];
        let f = filter();
        assert_eq!(f.filter(&entries, &repo()), f.filter(&entries, &repo()));
    }

    #[test]
    fn test_trailing_slash_on_raw_base() {
        let f = ManifestFilter::new(vec!["pom.xml".to_string()], "https://raw.example/", "main");
        let found = f.filter(&[blob("pom.xml")], &repo());
        assert_eq!(found[0].download_url, "https://raw.example/acme/widget/main/pom.xml");
    }
}
