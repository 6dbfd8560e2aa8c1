use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::debug;

use crate::domain::errors::BackendError;
use crate::ports::outbound::{LogicalVolume, LvmBackend, VolumeGroup};

/// LVM default extent size.
pub const DEFAULT_EXTENT_SIZE: u64 = 128 * 1024 * 1024;

#[derive(Debug)]
struct FakeVg {
    extent_size: u64,
    tags: Vec<String>,
    lvs: BTreeMap<String, LogicalVolume>,
}

/// In-memory `LvmBackend`.
///
/// Device nodes live under `dev_root/<vg>/<lv>` and exist only between
/// `activate_lv` and `deactivate_lv`.
#[derive(Debug)]
pub struct FakeLvm {
    dev_root: PathBuf,
    vgs: RwLock<HashMap<String, FakeVg>>,
}

impl FakeLvm {
    pub fn new(dev_root: impl Into<PathBuf>) -> Self {
        Self {
            dev_root: dev_root.into(),
            vgs: RwLock::new(HashMap::new()),
        }
    }

    pub fn dev_root(&self) -> &Path {
        &self.dev_root
    }

    /// Create an empty VG. An existing VG of that name is kept.
    pub fn create_vg(&self, name: &str, extent_size: u64) {
        self.vgs
            .write()
            .entry(name.to_string())
            .or_insert_with(|| FakeVg {
                extent_size: extent_size.max(1),
                tags: Vec::new(),
                lvs: BTreeMap::new(),
            });
    }

    /// Create the device node of an LV as a sparse file of the LV's size.
    pub fn activate_lv(&self, vg: &str, lv: &str) -> Result<PathBuf, BackendError> {
        let mut vgs = self.vgs.write();
        let entry = lv_entry(&mut vgs, vg, lv)?;

        let path = self.lv_path(vg, lv);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BackendError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| BackendError::io(&path, e))?;
        file.set_len(entry.size())
            .map_err(|e| BackendError::io(&path, e))?;

        entry.active = true;
        debug!("[sd-manifest] Activated {}/{}", vg, lv);
        Ok(path)
    }

    /// Remove the device node of an LV.
    pub fn deactivate_lv(&self, vg: &str, lv: &str) -> Result<(), BackendError> {
        let mut vgs = self.vgs.write();
        let entry = lv_entry(&mut vgs, vg, lv)?;
        remove_node(&self.lv_path(vg, lv))?;
        entry.active = false;
        Ok(())
    }
}

fn vg_entry<'a>(vgs: &'a mut HashMap<String, FakeVg>, vg: &str) -> Result<&'a mut FakeVg, BackendError> {
    vgs.get_mut(vg)
        .ok_or_else(|| BackendError::VgNotFound(vg.to_string()))
}

fn lv_entry<'a>(
    vgs: &'a mut HashMap<String, FakeVg>,
    vg: &str,
    lv: &str,
) -> Result<&'a mut LogicalVolume, BackendError> {
    vg_entry(vgs, vg)?
        .lvs
        .get_mut(lv)
        .ok_or_else(|| BackendError::LvNotFound {
            vg: vg.to_string(),
            lv: lv.to_string(),
        })
}

fn retag(tags: &mut Vec<String>, del: &[String], add: &[String]) {
    tags.retain(|t| !del.contains(t));
    for tag in add {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }
}

fn remove_node(path: &Path) -> Result<(), BackendError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BackendError::io(path, e)),
    }
}

impl LvmBackend for FakeLvm {
    fn get_vg(&self, vg: &str) -> Result<VolumeGroup, BackendError> {
        let vgs = self.vgs.read();
        let entry = vgs
            .get(vg)
            .ok_or_else(|| BackendError::VgNotFound(vg.to_string()))?;
        Ok(VolumeGroup {
            name: vg.to_string(),
            extent_size: entry.extent_size,
            tags: entry.tags.clone(),
        })
    }

    fn change_vg_tags(&self, vg: &str, del: &[String], add: &[String]) -> Result<(), BackendError> {
        let mut vgs = self.vgs.write();
        retag(&mut vg_entry(&mut vgs, vg)?.tags, del, add);
        Ok(())
    }

    fn create_lv(
        &self,
        vg: &str,
        lv: &str,
        size: u64,
        tags: &[String],
    ) -> Result<LogicalVolume, BackendError> {
        let mut vgs = self.vgs.write();
        let entry = vg_entry(&mut vgs, vg)?;
        if entry.lvs.contains_key(lv) {
            return Err(BackendError::LvExists {
                vg: vg.to_string(),
                lv: lv.to_string(),
            });
        }

        let volume = LogicalVolume {
            vg_name: vg.to_string(),
            name: lv.to_string(),
            extent_count: size.div_ceil(entry.extent_size).max(1),
            extent_size: entry.extent_size,
            tags: tags.to_vec(),
            active: false,
        };
        entry.lvs.insert(lv.to_string(), volume.clone());
        debug!(
            "[sd-manifest] Created LV {}/{} ({} extents)",
            vg, lv, volume.extent_count
        );
        Ok(volume)
    }

    fn get_lv(&self, vg: &str, lv: &str) -> Result<LogicalVolume, BackendError> {
        let mut vgs = self.vgs.write();
        lv_entry(&mut vgs, vg, lv).map(|entry| entry.clone())
    }

    fn list_lvs(&self, vg: &str) -> Result<Vec<LogicalVolume>, BackendError> {
        let vgs = self.vgs.read();
        let entry = vgs
            .get(vg)
            .ok_or_else(|| BackendError::VgNotFound(vg.to_string()))?;
        Ok(entry.lvs.values().cloned().collect())
    }

    fn change_lv_tags(
        &self,
        vg: &str,
        lv: &str,
        del: &[String],
        add: &[String],
    ) -> Result<(), BackendError> {
        let mut vgs = self.vgs.write();
        retag(&mut lv_entry(&mut vgs, vg, lv)?.tags, del, add);
        Ok(())
    }

    fn remove_lv(&self, vg: &str, lv: &str) -> Result<(), BackendError> {
        let mut vgs = self.vgs.write();
        let entry = vg_entry(&mut vgs, vg)?;
        if entry.lvs.remove(lv).is_none() {
            return Err(BackendError::LvNotFound {
                vg: vg.to_string(),
                lv: lv.to_string(),
            });
        }
        remove_node(&self.lv_path(vg, lv))
    }

    fn lv_path(&self, vg: &str, lv: &str) -> PathBuf {
        self.dev_root.join(vg).join(lv)
    }
}
