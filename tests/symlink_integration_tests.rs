//! Integration tests for activation, link repair and presets through the
//! AppContext. Directory links need no privileges on Unix, so these run
//! there only.

#![cfg(unix)]

use camino::Utf8PathBuf;
use std::fs;
use tempfile::TempDir;
use xxmm::services::library::Disposal;
use xxmm::services::symlinks::is_dir_link;
use xxmm::services::{DEFAULT_PRESET, LinkOutcome, MOD_JSON};
use xxmm::{AppContext, ConfigManager, AppSettings};

fn create_context(mods: &[&str]) -> (TempDir, AppContext) {
    let temp = TempDir::new().unwrap();
    let base = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
    for name in mods {
        let dir = base.join("ModLibrary").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MOD_JSON), r#"{"character":"Hero"}"#).unwrap();
    }

    let mut settings = AppSettings::default();
    settings.game_mods_dir = "XXMIModsDirectory".to_string();
    let config = ConfigManager::new(base.join("Settings")).unwrap();
    config.save_settings(&settings).unwrap();

    let ctx = AppContext::load(&base).unwrap();
    (temp, ctx)
}

#[test]
fn test_activate_creates_missing_mods_dir_and_link() {
    let (_temp, ctx) = create_context(&["Foo"]);
    let mods_dir = ctx.paths().game_mods.clone();
    assert!(!mods_dir.exists());

    let outcome = ctx.activate_mod("Foo").unwrap();

    assert_eq!(outcome, LinkOutcome::Created);
    let link = mods_dir.join("Foo");
    assert!(is_dir_link(&link));
    assert_eq!(
        fs::canonicalize(&link).unwrap(),
        fs::canonicalize(ctx.paths().mod_library.join("Foo")).unwrap()
    );
    assert!(ctx.is_active("Foo"));
}

#[test]
fn test_toggle_twice_restores_link_and_registry() {
    let (_temp, ctx) = create_context(&["Foo", "Bar"]);
    ctx.activate_mod("Bar").unwrap();
    let link = ctx.paths().game_mods.join("Foo");
    let registry_before = fs::read_to_string(&ctx.paths().active_mods_file).unwrap();

    assert!(ctx.toggle_mod("Foo").unwrap());
    assert!(is_dir_link(&link));
    assert!(!ctx.toggle_mod("Foo").unwrap());

    assert!(!link.exists() && !is_dir_link(&link));
    assert!(!ctx.is_active("Foo"));
    assert_eq!(ctx.active_names(), vec!["Bar"]);
    let registry_after: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&ctx.paths().active_mods_file).unwrap()).unwrap();
    let registry_before: serde_json::Value = serde_json::from_str(&registry_before).unwrap();
    assert_eq!(registry_after["Bar"], registry_before["Bar"]);
    assert_ne!(registry_after["Foo"], serde_json::Value::Bool(true));
}

#[test]
fn test_validate_links_twice_changes_nothing_the_second_time() {
    let (_temp, ctx) = create_context(&["Foo", "Bar"]);
    ctx.activate_mod("Foo").unwrap();
    ctx.activate_mod("Bar").unwrap();

    // Drift: one link deleted behind our back, one stray link added
    fs::remove_file(ctx.paths().game_mods.join("Foo")).unwrap();
    std::os::unix::fs::symlink(
        ctx.paths().mod_library.join("Bar"),
        ctx.paths().game_mods.join("Stray"),
    )
    .unwrap();

    let first = ctx.validate_links().unwrap();
    assert_eq!(first.created, vec!["Foo"]);
    assert_eq!(first.removed_orphans, vec!["Stray"]);

    let second = ctx.validate_links().unwrap();
    assert_eq!(second.changes(), 0);
}

#[test]
fn test_deactivate_leaves_real_directory_alone() {
    let (_temp, ctx) = create_context(&["Foo"]);
    let real = ctx.paths().game_mods.join("Foo");
    fs::create_dir_all(&real).unwrap();

    assert_eq!(ctx.deactivate_mod("Foo").unwrap(), LinkOutcome::NotALink);
    assert!(real.is_dir());
}

#[test]
fn test_preset_save_and_load() {
    let (_temp, ctx) = create_context(&["Foo", "Bar"]);
    ctx.activate_mod("Foo").unwrap();
    ctx.save_preset("Evening").unwrap();

    ctx.deactivate_mod("Foo").unwrap();
    ctx.activate_mod("Bar").unwrap();

    let report = ctx.load_preset("Evening").unwrap();

    assert_eq!(report.links_removed, 1);
    assert_eq!(report.links_created, 1);
    assert!(is_dir_link(&ctx.paths().game_mods.join("Foo")));
    assert!(!is_dir_link(&ctx.paths().game_mods.join("Bar")));
    assert_eq!(ctx.state().snapshot().active_mods, 1);

    let presets = ctx.list_presets().unwrap();
    assert!(presets.contains(&DEFAULT_PRESET.to_string()));
    assert!(presets.contains(&"Evening".to_string()));

    ctx.delete_preset("Evening").unwrap();
    assert!(ctx.load_preset("Evening").is_err());
}

#[test]
fn test_unsafe_names_are_rejected_before_touching_disk() {
    let (_temp, ctx) = create_context(&[]);

    let outcome = ctx.activate_mod("../outside").unwrap();

    assert!(matches!(outcome, LinkOutcome::Rejected(_)));
    assert!(!ctx.paths().game_mods.exists());
    assert!(ctx.save_preset("..\\up").is_err());
}

#[test]
fn test_delete_active_mod_removes_link_and_registry_entry() {
    let (_temp, ctx) = create_context(&["Foo", "Bar"]);
    ctx.activate_mod("Foo").unwrap();
    ctx.activate_mod("Bar").unwrap();
    ctx.record("Foo").unwrap();
    assert_eq!(ctx.cache().len(), 1);

    ctx.delete_mod("Foo", Disposal::Permanent).unwrap();

    assert!(!ctx.paths().mod_library.join("Foo").exists());
    assert!(!is_dir_link(&ctx.paths().game_mods.join("Foo")));
    assert!(ctx.cache().is_empty());
    assert_eq!(ctx.active_names(), vec!["Bar"]);
    let registry: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&ctx.paths().active_mods_file).unwrap()).unwrap();
    assert!(registry.get("Foo").is_none());
    assert_eq!(ctx.state().snapshot().active_mods, 1);
    assert!(ctx.delete_mod("../Bar", Disposal::Permanent).is_err());
}

#[test]
fn test_rename_active_mod_moves_link_and_registry_entry() {
    let (_temp, ctx) = create_context(&["Foo", "Bar"]);
    ctx.activate_mod("Foo").unwrap();
    ctx.record("Foo").unwrap();

    ctx.rename_mod("Foo", "FooRenamed").unwrap();

    let library = &ctx.paths().mod_library;
    let new_link = ctx.paths().game_mods.join("FooRenamed");
    assert!(!library.join("Foo").exists());
    assert!(!is_dir_link(&ctx.paths().game_mods.join("Foo")));
    assert!(is_dir_link(&new_link));
    assert_eq!(
        fs::canonicalize(&new_link).unwrap(),
        fs::canonicalize(library.join("FooRenamed")).unwrap()
    );
    assert_eq!(ctx.active_names(), vec!["FooRenamed"]);
    assert!(ctx.cache().is_empty());
    assert_eq!(ctx.record("FooRenamed").unwrap().character, "Hero");
}

#[test]
fn test_rename_refusal_keeps_mod_linked() {
    let (_temp, ctx) = create_context(&["Foo", "Bar"]);
    ctx.activate_mod("Foo").unwrap();

    assert!(ctx.rename_mod("Foo", "Bar").is_err());
    assert!(ctx.rename_mod("Foo", "..\\up").is_err());

    assert!(is_dir_link(&ctx.paths().game_mods.join("Foo")));
    assert!(ctx.paths().mod_library.join("Foo").is_dir());
    assert_eq!(ctx.active_names(), vec!["Foo"]);
}
