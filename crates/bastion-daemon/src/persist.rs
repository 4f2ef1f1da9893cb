// crates/bastion-daemon/src/persist.rs
//
// Daemon state on disk: one JSON file per module at
// `<data_dir>/modules/<module-id>.json`, plus the asset bank backing them
// at `<data_dir>/bank.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use bastion_core::{AssetBankState, ModuleId};
use bastion_ledger::EngineState;

fn modules_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("modules")
}

pub fn bank_path(data_dir: &Path) -> PathBuf {
    data_dir.join("bank.json")
}

/// Write then rename so a crash never leaves a truncated file.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

pub fn snapshot_path(data_dir: &Path, module_id: &ModuleId) -> PathBuf {
    modules_dir(data_dir).join(format!("{}.json", module_id))
}

/// Write every snapshot, replacing older files. Returns the number written.
pub fn save_snapshots(
    data_dir: &Path,
    snapshots: &[EngineState],
) -> Result<usize, Box<dyn std::error::Error>> {
    fs::create_dir_all(modules_dir(data_dir))?;
    for snapshot in snapshots {
        write_json(&snapshot_path(data_dir, &snapshot.module_id()), snapshot)?;
    }
    Ok(snapshots.len())
}

/// Write the asset bank the module snapshots are backed by.
pub fn save_bank(data_dir: &Path, bank: &AssetBankState) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(data_dir)?;
    write_json(&bank_path(data_dir), bank)
}

/// Read the persisted asset bank, if one exists.
pub fn load_bank(data_dir: &Path) -> Result<Option<AssetBankState>, Box<dyn std::error::Error>> {
    let path = bank_path(data_dir);
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&path)?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Read the snapshot for `module_id`, if one exists.
pub fn load_snapshot(
    data_dir: &Path,
    module_id: &ModuleId,
) -> Result<Option<EngineState>, Box<dyn std::error::Error>> {
    let path = snapshot_path(data_dir, module_id);
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&path)?;
    let snapshot: EngineState = serde_json::from_str(&contents)?;
    if snapshot.module_id() != *module_id {
        return Err(format!(
            "Snapshot {} belongs to module {}",
            path.display(),
            snapshot.module_id()
        )
        .into());
    }
    Ok(Some(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bastion_core::{AccountId, AssetBank, AssetId, InMemoryAssetBank};
    use bastion_ledger::{ConfigUpdate, Delays, Engine, NoDrip, PoolConfig, Roles};
    use uuid::Uuid;

    fn temp_dir(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("bastion_test_{}_{}", label, Uuid::now_v7()))
    }

    fn engine(module_id: ModuleId) -> Engine {
        Engine::new(
            module_id,
            Roles {
                owner: AccountId::repeat(1),
                guardian: AccountId::repeat(2),
                manager: AccountId::repeat(3),
            },
            ConfigUpdate {
                pools: vec![PoolConfig {
                    max_loss_fraction: 1_000,
                    asset: AssetId::repeat(0xa1),
                }],
                bindings: Vec::new(),
                delays: Delays {
                    config_update_delay: 10,
                    config_update_grace_period: 5,
                    withdrawal_delay: 1,
                },
            },
            Arc::new(InMemoryAssetBank::new()),
            Arc::new(NoDrip),
            42,
        )
        .unwrap()
    }

    #[test]
    fn test_save_then_load() {
        let dir = temp_dir("persist");
        let id = ModuleId::repeat(0x10);
        let snapshot = engine(id).snapshot();

        assert_eq!(save_snapshots(&dir, &[snapshot]).unwrap(), 1);
        let loaded = load_snapshot(&dir, &id).unwrap().unwrap();
        assert_eq!(loaded.module_id(), id);
        assert!(snapshot_path(&dir, &id).exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_bank_save_then_load() {
        let dir = temp_dir("bank");
        assert!(load_bank(&dir).unwrap().is_none());

        let bank = InMemoryAssetBank::new();
        bank.register_asset(AssetId::repeat(0xa1), 6);
        bank.mint(&AssetId::repeat(0xa1), &AccountId::repeat(0x10), 1_000)
            .unwrap();
        save_bank(&dir, &bank.snapshot()).unwrap();

        let loaded = load_bank(&dir).unwrap().unwrap();
        assert_eq!(loaded, bank.snapshot());
        let rebuilt = InMemoryAssetBank::from_state(loaded);
        assert_eq!(
            rebuilt
                .balance_of(&AssetId::repeat(0xa1), &AccountId::repeat(0x10))
                .unwrap(),
            1_000
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_snapshot_is_none() {
        let dir = temp_dir("missing");
        assert!(load_snapshot(&dir, &ModuleId::repeat(1)).unwrap().is_none());
    }

    #[test]
    fn test_misfiled_snapshot_rejected() {
        let dir = temp_dir("misfiled");
        let snapshot = engine(ModuleId::repeat(0x10)).snapshot();
        save_snapshots(&dir, &[snapshot]).unwrap();
        fs::rename(
            snapshot_path(&dir, &ModuleId::repeat(0x10)),
            snapshot_path(&dir, &ModuleId::repeat(0x20)),
        )
        .unwrap();
        assert!(load_snapshot(&dir, &ModuleId::repeat(0x20)).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
