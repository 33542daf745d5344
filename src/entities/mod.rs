//! Business entities managed through the generic CRUD layer.

pub mod animals;
pub mod clients;
pub mod logs;
pub mod reports;
pub mod reservations;
pub mod stock;
pub mod users;

pub use animals::{AnimalForm, AnimalRow};
pub use clients::ClientForm;
pub use reports::{ReportForm, ReportRow};
pub use reservations::{Appointment, ReservationForm, ReservationRow};
pub use stock::{CategoryForm, ProductForm, ProductRow, StockSummary, SupplierForm};
pub use users::{AccountForm, AccountRow};
