//! Products, their categories and suppliers.

use chrono::{NaiveDate, TimeDelta, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;

use crate::crud::{self, CrudError, Resource, ResourceForm};
use crate::db::last_insert_id;
use crate::models::{Category, CategoryInput, Product, ProductInput, Supplier, SupplierInput};
use crate::schema::{categories, products, suppliers};

#[derive(Debug, Clone, Serialize)]
pub struct ProductRow {
    #[serde(flatten)]
    pub product: Product,
    pub category_name: String,
    pub supplier_name: String,
}

impl ProductRow {
    pub fn stock_value(&self) -> f64 {
        self.product.price * f64::from(self.product.quantity)
    }

    pub fn is_low(&self, threshold: i32) -> bool {
        self.product.quantity <= threshold
    }
}

#[derive(Debug, FromForm)]
pub struct ProductForm {
    pub edit_id: Option<i32>,
    pub name: Option<String>,
    pub quantity: Option<String>,
    pub price: Option<String>,
    pub expires_on: Option<String>,
    pub category: Option<String>,
    pub supplier: Option<String>,
    pub description: Option<String>,
}

impl ResourceForm for ProductForm {
    type Input = ProductInput;

    fn edit_id(&self) -> Option<i32> {
        self.edit_id
    }

    fn validate(self, _editing: bool) -> Result<ProductInput, CrudError> {
        let quantity: i32 = crud::required_parse(self.quantity, "Quantity")?;
        if quantity < 0 {
            return Err(CrudError::invalid("Quantity cannot be negative."));
        }
        let price: f64 = crud::required_parse(self.price, "Price")?;
        if !price.is_finite() || price < 0.0 {
            return Err(CrudError::invalid("Price must be a positive amount."));
        }
        Ok(ProductInput {
            name: crud::required(self.name, "Name")?,
            category_id: crud::required_parse(self.category, "Category")?,
            quantity,
            price: (price * 100.0).round() / 100.0,
            expires_on: crud::parse_date(self.expires_on, "Expiration date")?,
            supplier_id: crud::required_parse(self.supplier, "Supplier")?,
            description: crud::optional(self.description),
        })
    }
}

fn references_exist(conn: &mut SqliteConnection, input: &ProductInput) -> Result<(), CrudError> {
    let categories_found: i64 = categories::table
        .filter(categories::id.eq(input.category_id))
        .count()
        .get_result(conn)?;
    if categories_found == 0 {
        return Err(CrudError::invalid("Selected category does not exist."));
    }
    let suppliers_found: i64 = suppliers::table
        .filter(suppliers::id.eq(input.supplier_id))
        .count()
        .get_result(conn)?;
    if suppliers_found == 0 {
        return Err(CrudError::invalid("Selected supplier does not exist."));
    }
    Ok(())
}

type RowTuple = (Product, String, String);

fn into_row((product, category_name, supplier_name): RowTuple) -> ProductRow {
    ProductRow { product, category_name, supplier_name }
}

impl Resource for ProductRow {
    type Input = ProductInput;

    const ENTITY: &'static str = "Product";
    const CSV_HEADER: &'static [&'static str] =
        &["Name", "Category", "Quantity", "Price", "Expiration", "Supplier"];

    fn list(conn: &mut SqliteConnection) -> QueryResult<Vec<Self>> {
        let rows = products::table
            .inner_join(categories::table)
            .inner_join(suppliers::table)
            .order(products::name.asc())
            .select((Product::as_select(), categories::name, suppliers::name))
            .load::<RowTuple>(conn)?;
        Ok(rows.into_iter().map(into_row).collect())
    }

    fn find(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Self>> {
        let row = products::table
            .inner_join(categories::table)
            .inner_join(suppliers::table)
            .filter(products::id.eq(id))
            .select((Product::as_select(), categories::name, suppliers::name))
            .first::<RowTuple>(conn)
            .optional()?;
        Ok(row.map(into_row))
    }

    fn insert(conn: &mut SqliteConnection, input: &ProductInput) -> Result<i32, CrudError> {
        references_exist(conn, input)?;
        diesel::insert_into(products::table)
            .values((input, products::added_on.eq(Utc::now().date_naive())))
            .execute(conn)?;
        Ok(last_insert_id(conn)?)
    }

    fn update(conn: &mut SqliteConnection, id: i32, input: &ProductInput) -> Result<usize, CrudError> {
        references_exist(conn, input)?;
        Ok(diesel::update(products::table.find(id)).set(input).execute(conn)?)
    }

    fn delete(conn: &mut SqliteConnection, id: i32) -> QueryResult<usize> {
        diesel::delete(products::table.find(id)).execute(conn)
    }

    fn id(&self) -> i32 {
        self.product.id
    }

    fn label(&self) -> String {
        self.product.name.clone()
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.product.name.as_str(),
            self.category_name.as_str(),
            self.supplier_name.as_str(),
        ]
    }

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.product.name.clone(),
            self.category_name.clone(),
            self.product.quantity.to_string(),
            format!("{:.2}", self.product.price),
            self.product.expires_on.format("%Y-%m-%d").to_string(),
            self.supplier_name.clone(),
        ]
    }
}

#[derive(Debug, FromForm)]
pub struct CategoryForm {
    pub edit_id: Option<i32>,
    pub name: Option<String>,
}

impl ResourceForm for CategoryForm {
    type Input = CategoryInput;

    fn edit_id(&self) -> Option<i32> {
        self.edit_id
    }

    fn validate(self, _editing: bool) -> Result<CategoryInput, CrudError> {
        Ok(CategoryInput { name: crud::required(self.name, "Category name")? })
    }
}

impl Resource for Category {
    type Input = CategoryInput;

    const ENTITY: &'static str = "Category";

    fn list(conn: &mut SqliteConnection) -> QueryResult<Vec<Self>> {
        categories::table
            .order(categories::name.asc())
            .select(Category::as_select())
            .load(conn)
    }

    fn find(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Self>> {
        categories::table
            .find(id)
            .select(Category::as_select())
            .first(conn)
            .optional()
    }

    fn insert(conn: &mut SqliteConnection, input: &CategoryInput) -> Result<i32, CrudError> {
        diesel::insert_into(categories::table).values(input).execute(conn)?;
        Ok(last_insert_id(conn)?)
    }

    fn update(conn: &mut SqliteConnection, id: i32, input: &CategoryInput) -> Result<usize, CrudError> {
        Ok(diesel::update(categories::table.find(id)).set(input).execute(conn)?)
    }

    fn delete(conn: &mut SqliteConnection, id: i32) -> QueryResult<usize> {
        diesel::delete(categories::table.find(id)).execute(conn)
    }

    fn id(&self) -> i32 {
        self.id
    }

    fn label(&self) -> String {
        self.name.clone()
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.name.as_str()]
    }
}

#[derive(Debug, FromForm)]
pub struct SupplierForm {
    pub edit_id: Option<i32>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

impl ResourceForm for SupplierForm {
    type Input = SupplierInput;

    fn edit_id(&self) -> Option<i32> {
        self.edit_id
    }

    fn validate(self, _editing: bool) -> Result<SupplierInput, CrudError> {
        Ok(SupplierInput {
            name: crud::required(self.name, "Supplier name")?,
            phone: crud::required(self.phone, "Phone")?,
            email: crud::required(self.email, "Email")?,
            address: crud::required(self.address, "Address")?,
        })
    }
}

impl Resource for Supplier {
    type Input = SupplierInput;

    const ENTITY: &'static str = "Supplier";

    fn list(conn: &mut SqliteConnection) -> QueryResult<Vec<Self>> {
        suppliers::table
            .order(suppliers::name.asc())
            .select(Supplier::as_select())
            .load(conn)
    }

    fn find(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Self>> {
        suppliers::table
            .find(id)
            .select(Supplier::as_select())
            .first(conn)
            .optional()
    }

    fn insert(conn: &mut SqliteConnection, input: &SupplierInput) -> Result<i32, CrudError> {
        diesel::insert_into(suppliers::table).values(input).execute(conn)?;
        Ok(last_insert_id(conn)?)
    }

    fn update(conn: &mut SqliteConnection, id: i32, input: &SupplierInput) -> Result<usize, CrudError> {
        Ok(diesel::update(suppliers::table.find(id)).set(input).execute(conn)?)
    }

    fn delete(conn: &mut SqliteConnection, id: i32) -> QueryResult<usize> {
        diesel::delete(suppliers::table.find(id)).execute(conn)
    }

    fn id(&self) -> i32 {
        self.id
    }

    fn label(&self) -> String {
        self.name.clone()
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.name.as_str(),
            self.phone.as_str(),
            self.email.as_str(),
            self.address.as_str(),
        ]
    }
}

/// Stock figures shown on the dashboard.
#[derive(Debug, Serialize)]
pub struct StockSummary {
    pub total_value: f64,
    pub recent_value: f64,
    pub low_stock: Vec<ProductRow>,
}

impl StockSummary {
    /// `recent_value` covers products added in the 30 days up to `today`;
    /// `low_stock` holds up to five products at or below `threshold`,
    /// lowest quantity first.
    pub fn compute(products: &[ProductRow], today: NaiveDate, threshold: i32) -> Self {
        let since = today - TimeDelta::days(30);
        let total_value = products.iter().map(ProductRow::stock_value).sum();
        let recent_value = products
            .iter()
            .filter(|p| p.product.added_on >= since)
            .map(ProductRow::stock_value)
            .sum();

        let mut low_stock: Vec<ProductRow> = products
            .iter()
            .filter(|p| p.is_low(threshold))
            .cloned()
            .collect();
        low_stock.sort_by_key(|p| p.product.quantity);
        low_stock.truncate(5);

        StockSummary { total_value, recent_value, low_stock }
    }
}
