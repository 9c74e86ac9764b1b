use std::io::Write;

use crm_sync_vtiger::settings::SettingProvider;
use crm_sync_vtiger::VtigerSettings;

#[test]
fn test_load_settings_from_file() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(
        file,
        r#"{{"owner": "19x4", "update_owner": true, "push_contacts_as_contacts": false, "query_limit": 50}}"#
    )?;

    let settings = VtigerSettings::load(file.path())?;
    assert_eq!(settings.owner(), Some("19x4"));
    assert!(settings.should_update_owner());
    assert!(!settings.should_push_contacts_as_contacts());
    assert_eq!(settings.query_limit(), 50);
    assert_eq!(settings.integration_name(), "VtigerCrm");
    Ok(())
}

#[test]
fn test_missing_file_names_the_path() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("vtiger.json");
    let err = VtigerSettings::load(&path).unwrap_err();
    assert!(err.to_string().contains("vtiger.json"));
}

#[test]
fn test_invalid_file_is_rejected() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(file, r#"{{"query_limit": 0}}"#)?;
    assert!(VtigerSettings::load(file.path()).is_err());
    Ok(())
}
