//! Vtiger CRM integration
//!
//! Contacts and Leads exchanges on top of the `crm-sync` engine. The CRM
//! itself is reached through [`VtigerClient`]; [`FakeVtigerClient`] stands in
//! for it in tests.

pub mod client;
pub mod contact_exchange;
pub mod data_exchange;
pub mod fake;
pub mod general_exchange;
pub mod lead_exchange;
pub mod models;
pub mod reader;
pub mod settings;
pub mod validator;

pub use client::{RecordQuery, VtigerClient};
pub use contact_exchange::ContactDataExchange;
pub use data_exchange::VtigerSyncDataExchange;
pub use fake::FakeVtigerClient;
pub use general_exchange::GeneralDataExchange;
pub use lead_exchange::LeadDataExchange;
pub use models::{Contact, Lead, ModelFactory, ModuleFieldInfo, ModuleInfo, VtigerRecord};
pub use reader::ChangeReader;
pub use settings::{SettingProvider, VtigerSettings};
pub use validator::ObjectValidator;
