use diesel::prelude::*;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use crate::rbac::{Role, Theme};
use crate::schema::{
    animals, audit_events, categories, clients, products, profiles, reports, reservations,
    suppliers, users,
};

#[derive(Queryable, Identifiable, Selectable, Serialize, Clone, Debug)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub date_joined: NaiveDateTime,
}

impl User {
    /// "First Last", or the username when no name is set.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub password_hash: &'a str,
    pub is_active: bool,
    pub is_superuser: bool,
    pub date_joined: NaiveDateTime,
}

#[derive(Queryable, Identifiable, Selectable, Serialize, Clone, Debug)]
#[diesel(table_name = profiles)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Profile {
    pub id: i32,
    pub user_id: i32,
    pub role: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub theme: String,
}

impl Profile {
    /// Stored role; the column is CHECK-constrained, so unknown values only
    /// appear on a hand-edited database and fall back to the least privilege.
    pub fn role(&self) -> Role {
        self.role.parse().unwrap_or_default()
    }

    pub fn theme(&self) -> Theme {
        self.theme.parse().unwrap_or_default()
    }
}

#[derive(Insertable)]
#[diesel(table_name = profiles)]
pub struct NewProfile<'a> {
    pub user_id: i32,
    pub role: &'a str,
    pub phone: Option<&'a str>,
    pub address: Option<&'a str>,
    pub theme: &'a str,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone)]
#[diesel(table_name = audit_events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AuditEvent {
    pub id: i32,
    pub user_id: Option<i32>,
    pub action: String,
    pub description: String,
    pub target_entity: Option<String>,
    pub target_id: Option<i32>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable, Clone, PartialEq)]
#[diesel(table_name = audit_events)]
pub struct NewAuditEvent {
    pub user_id: Option<i32>,
    pub action: String,
    pub description: String,
    pub target_entity: Option<String>,
    pub target_id: Option<i32>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Clone)]
#[diesel(table_name = clients)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Client {
    pub id: i32,
    pub last_name: String,
    pub first_name: String,
    pub phone: String,
    pub email: String,
}

impl Client {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = clients)]
pub struct ClientInput {
    pub last_name: String,
    pub first_name: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Clone)]
#[diesel(table_name = animals)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Animal {
    pub id: i32,
    pub name: String,
    pub species: String,
    pub breed: String,
    pub age: i32,
    pub client_id: i32,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = animals)]
pub struct AnimalInput {
    pub name: String,
    pub species: String,
    pub breed: String,
    pub age: i32,
    pub client_id: i32,
}

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Clone)]
#[diesel(table_name = reservations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Reservation {
    pub id: i32,
    pub client_id: i32,
    pub animal_id: i32,
    pub scheduled_at: NaiveDateTime,
    pub service: String,
    pub status: String,
    pub note: Option<String>,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = reservations)]
#[diesel(treat_none_as_null = true)]
pub struct ReservationInput {
    pub client_id: i32,
    pub animal_id: i32,
    pub scheduled_at: NaiveDateTime,
    pub service: String,
    pub status: String,
    pub note: Option<String>,
}

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Clone)]
#[diesel(table_name = categories)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Category {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = categories)]
pub struct CategoryInput {
    pub name: String,
}

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Clone)]
#[diesel(table_name = suppliers)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Supplier {
    pub id: i32,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = suppliers)]
pub struct SupplierInput {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
}

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Clone)]
#[diesel(table_name = products)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Product {
    pub id: i32,
    pub name: String,
    pub category_id: i32,
    pub quantity: i32,
    pub price: f64,
    pub added_on: NaiveDate,
    pub expires_on: NaiveDate,
    pub supplier_id: i32,
    pub description: Option<String>,
}

/// `added_on` is supplied separately on insert and never part of an update.
#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = products)]
#[diesel(treat_none_as_null = true)]
pub struct ProductInput {
    pub name: String,
    pub category_id: i32,
    pub quantity: i32,
    pub price: f64,
    pub expires_on: NaiveDate,
    pub supplier_id: i32,
    pub description: Option<String>,
}

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Clone)]
#[diesel(table_name = reports)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Report {
    pub id: i32,
    pub user_id: Option<i32>,
    pub subject: String,
    pub message: String,
    pub sent_at: NaiveDateTime,
    pub recipient: String,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = reports)]
#[diesel(treat_none_as_null = true)]
pub struct ReportInput {
    pub user_id: Option<i32>,
    pub subject: String,
    pub message: String,
    pub sent_at: NaiveDateTime,
    pub recipient: String,
}
