pub mod availability;
pub mod booking;
pub mod calendar;
pub mod collaborators;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod intent;
pub mod inventory;
pub mod tenancy;

pub use availability::{AvailabilityEngine, BusinessHours};
pub use booking::{BookingOutcome, BookingTransactor, ConflictCause};
pub use calendar::{CalendarProvider, TimeoutCalendar};
pub use collaborators::{LeadLogger, NotificationDispatcher};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use dispatch::{CallReply, FunctionCallHandler};
pub use domain::call::{Arguments, InboundCall, Operation, RequestEnvelope, Resolution};
pub use domain::schedule::{BookingAttempt, ConfirmedBooking, Slot, TimeWindow};
pub use domain::tenant::{TenantConfig, TenantId};
pub use errors::{CallError, MissingField, ProviderError};
pub use intent::{IntentResolver, OperationRequest};
pub use inventory::{InventoryFilters, InventorySearch, InventoryStore, InventoryTable};
pub use tenancy::TenantRegistry;
