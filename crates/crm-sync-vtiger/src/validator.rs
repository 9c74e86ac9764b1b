//! Pre-submission validation of records against the module description

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

use crm_sync::normalizer::check_email;
use crm_sync_api::{FieldType, Result, SyncError};

use crate::client::{with_timeout, VtigerClient};
use crate::models::{BaseModel, ModuleFieldInfo, ModuleInfo, VtigerRecord};

pub struct ObjectValidator {
    client: Arc<dyn VtigerClient>,
    timeout: Duration,
    user_ids: OnceCell<HashSet<String>>,
}

impl ObjectValidator {
    pub fn new(client: Arc<dyn VtigerClient>, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            user_ids: OnceCell::new(),
        }
    }

    /// Check every field the record carries.
    ///
    /// Field-level problems fail with `InvalidObject`; an unknown field type
    /// fails with `UnknownFieldType`.
    pub async fn validate(&self, record: &VtigerRecord, module: &ModuleInfo) -> Result<()> {
        let model = record.model();
        for (name, value) in model.data() {
            let info = module.field(name).ok_or_else(|| {
                invalid(module, name, "Field is not described by the module")
            })?;
            self.validate_field(module, info, value).await?;
        }
        Ok(())
    }

    async fn validate_field(
        &self,
        module: &ModuleInfo,
        info: &ModuleFieldInfo,
        value: &serde_json::Value,
    ) -> Result<()> {
        let field_type = info.field_type()?;
        let text = match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) if s.is_empty() => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        };

        let Some(text) = text else {
            if info.mandatory && !info.nullable {
                return Err(invalid(module, &info.name, "Value is required"));
            }
            return Ok(());
        };

        match field_type {
            FieldType::Email => {
                check_email(&text).map_err(|reason| invalid(module, &info.name, reason))
            }
            FieldType::Owner => {
                if self.user_ids().await?.contains(&text) {
                    Ok(())
                } else {
                    Err(invalid(
                        module,
                        &info.name,
                        &format!("User '{}' does not exist", text),
                    ))
                }
            }
            FieldType::String
            | FieldType::Text
            | FieldType::Phone
            | FieldType::Picklist
            | FieldType::Autogenerated
            | FieldType::Reference
            | FieldType::Boolean
            | FieldType::DoNotContact
            | FieldType::Date
            | FieldType::DateTime => Ok(()),
        }
    }

    async fn user_ids(&self) -> Result<&HashSet<String>> {
        self.user_ids
            .get_or_try_init(|| async {
                let users =
                    with_timeout(self.timeout, "list_users", self.client.list_users()).await?;
                debug!(count = users.len(), "Loaded CRM users");
                Ok(users.into_iter().map(|u| u.id).collect())
            })
            .await
    }
}

fn invalid(module: &ModuleInfo, field: &str, reason: &str) -> SyncError {
    SyncError::InvalidObject {
        object: module.name.clone(),
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeVtigerClient;
    use crate::models::{FieldMap, ModelFactory};
    use crm_sync_api::RemoteObject;
    use serde_json::json;

    fn contact(pairs: &[(&str, serde_json::Value)]) -> VtigerRecord {
        let data: FieldMap = pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        ModelFactory::create(RemoteObject::Contacts, data)
    }

    async fn setup() -> (Arc<FakeVtigerClient>, ObjectValidator, ModuleInfo) {
        let fake = Arc::new(FakeVtigerClient::new());
        let module = fake.describe(RemoteObject::Contacts).await.unwrap();
        let validator = ObjectValidator::new(fake.clone(), Duration::from_secs(5));
        (fake, validator, module)
    }

    #[tokio::test]
    async fn test_valid_record_passes() {
        let (_, validator, module) = setup().await;
        let record = contact(&[
            ("lastname", json!("Doe")),
            ("email", json!("a@x.com")),
            ("assigned_user_id", json!("19x1")),
            ("emailoptout", json!("1")),
        ]);
        validator.validate(&record, &module).await.unwrap();
    }

    #[tokio::test]
    async fn test_required_field_must_not_be_empty() {
        let (_, validator, module) = setup().await;
        let err = validator
            .validate(&contact(&[("lastname", json!(""))]), &module)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidObject { ref field, .. } if field == "lastname"));
        assert!(err.is_record_level());
    }

    #[tokio::test]
    async fn test_bad_email_and_unknown_owner() {
        let (_, validator, module) = setup().await;
        assert!(matches!(
            validator
                .validate(&contact(&[("email", json!("not-an-email"))]), &module)
                .await,
            Err(SyncError::InvalidObject { .. })
        ));
        assert!(matches!(
            validator
                .validate(&contact(&[("assigned_user_id", json!("19x99"))]), &module)
                .await,
            Err(SyncError::InvalidObject { .. })
        ));
    }

    #[tokio::test]
    async fn test_undescribed_field_and_unknown_type() {
        let (fake, validator, _) = setup().await;
        fake.describe_field(RemoteObject::Contacts, ModuleFieldInfo::new("rating", "currency"))
            .await;
        let module = fake.describe(RemoteObject::Contacts).await.unwrap();

        assert!(matches!(
            validator.validate(&contact(&[("nope", json!("x"))]), &module).await,
            Err(SyncError::InvalidObject { .. })
        ));
        assert!(matches!(
            validator.validate(&contact(&[("rating", json!("5"))]), &module).await,
            Err(SyncError::UnknownFieldType { .. })
        ));
    }

    #[tokio::test]
    async fn test_user_list_is_cached() {
        let (fake, validator, module) = setup().await;
        let record = contact(&[("assigned_user_id", json!("19x1"))]);
        validator.validate(&record, &module).await.unwrap();

        fake.set_unavailable(true);
        validator.validate(&record, &module).await.unwrap();
    }
}
