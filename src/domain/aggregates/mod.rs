//! Aggregates module
pub mod batch;
pub mod catalog;
pub mod order;
pub mod profile;
pub mod staged;
pub mod template;

pub use batch::OrderBatch;
pub use catalog::{OptionCatalog, OptionNameMapping, OptionProduct};
pub use order::{ConfirmationLine, IntegratedOrder, ShippingStatus, UnknownStatus};
pub use profile::{missing_profile_fields, Organization, ProfileField, SubAccount};
pub use staged::{MatchStatus, StagedOrder};
pub use template::{FieldMapping, InternalField, MarketTemplate};
