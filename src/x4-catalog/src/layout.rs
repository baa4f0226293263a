//! Paths inside an unpacked game data tree

use std::path::{Path, PathBuf};

pub const WARES_FILE: &str = "wares.xml";
pub const WAREGROUPS_FILE: &str = "waregroups.xml";

/// An unpacked X4 data tree (`libraries/`, `assets/`, `extensions/`, `t/`)
#[derive(Debug, Clone)]
pub struct GameLayout {
    root: PathBuf,
}

impl GameLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn library(&self, file: &str) -> PathBuf {
        self.root.join("libraries").join(file)
    }

    pub fn wares(&self) -> PathBuf {
        self.library(WARES_FILE)
    }

    pub fn waregroups(&self) -> PathBuf {
        self.library(WAREGROUPS_FILE)
    }

    pub fn extension(&self, dlc: &str) -> PathBuf {
        self.root.join("extensions").join(dlc)
    }

    /// Per-expansion overlays of a library file, in the given order
    pub fn library_overlays(&self, file: &str, dlc_order: &[String]) -> Vec<PathBuf> {
        dlc_order
            .iter()
            .map(|dlc| self.extension(dlc).join("libraries").join(file))
            .collect()
    }

    pub fn structures(&self) -> PathBuf {
        self.root.join("assets").join("structures")
    }

    /// Structure directories of each expansion, tagged with the expansion id
    pub fn extension_structures(&self, dlc_order: &[String]) -> Vec<(String, PathBuf)> {
        dlc_order
            .iter()
            .map(|dlc| (dlc.clone(), self.extension(dlc).join("assets").join("structures")))
            .collect()
    }

    pub fn translations(&self) -> PathBuf {
        self.root.join("t")
    }

    /// Whether the root looks like a data tree at all
    pub fn is_valid(&self) -> bool {
        self.wares().is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_paths_follow_order() {
        let layout = GameLayout::new("/data");
        let order = vec!["ego_dlc_boron".to_string(), "ego_dlc_split".to_string()];

        let overlays = layout.library_overlays(WARES_FILE, &order);
        assert_eq!(
            overlays,
            [
                PathBuf::from("/data/extensions/ego_dlc_boron/libraries/wares.xml"),
                PathBuf::from("/data/extensions/ego_dlc_split/libraries/wares.xml"),
            ]
        );

        let structures = layout.extension_structures(&order);
        assert_eq!(structures[1].0, "ego_dlc_split");
        assert_eq!(
            structures[1].1,
            PathBuf::from("/data/extensions/ego_dlc_split/assets/structures")
        );
    }

    #[test]
    fn test_base_paths() {
        let layout = GameLayout::new("/data");
        assert_eq!(layout.wares(), PathBuf::from("/data/libraries/wares.xml"));
        assert_eq!(layout.waregroups(), PathBuf::from("/data/libraries/waregroups.xml"));
        assert_eq!(layout.translations(), PathBuf::from("/data/t"));
        assert!(!layout.is_valid());
    }
}
