use diesel::sqlite::SqliteConnection;
use rocket::form::Form;
use rocket::http::Status;
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::State;
use rocket_dyn_templates::{Template, context};

use crate::audit::ViewMark;
use crate::auth::AssistantUser;
use crate::crud;
use crate::entities::{CategoryForm, ProductForm, ProductRow, SupplierForm};
use crate::models::{Category, Supplier};
use crate::routes::{Chrome, Page, connection, removed_redirect, saved_redirect};
use crate::state::AppState;

/// Which record, if any, the stock page opens for editing.
enum Editing {
    Nothing,
    Product(i32),
    Category(i32),
    Supplier(i32),
}

fn render_stock(
    conn: &mut SqliteConnection,
    state: &AppState,
    staff: &AssistantUser,
    mark: &ViewMark,
    flash: Option<FlashMessage<'_>>,
    search: Option<&str>,
    editing: Editing,
) -> Result<Page, Status> {
    let (product, category, supplier) = match editing {
        Editing::Nothing => (None, None, None),
        Editing::Product(id) => (Some(id), None, None),
        Editing::Category(id) => (None, Some(id), None),
        Editing::Supplier(id) => (None, None, Some(id)),
    };

    let products = crud::listing::<ProductRow>(conn, &state.audit, &staff.audit, mark, search, product)?;
    let categories = crud::listing::<Category>(conn, &state.audit, &staff.audit, mark, None, category)?;
    let suppliers = crud::listing::<Supplier>(conn, &state.audit, &staff.audit, mark, None, supplier)?;
    let threshold = state.settings.stock_alert_threshold;

    Ok(Page::Render(Template::render(
        "stock",
        context! {
            chrome: Chrome::new(&staff.user, flash),
            products,
            categories,
            suppliers,
            threshold,
        },
    )))
}

#[get("/stock?<search>&<edit>&<delete>")]
pub fn stock_page(
    staff: AssistantUser,
    state: &State<AppState>,
    mark: &ViewMark,
    flash: Option<FlashMessage<'_>>,
    search: Option<&str>,
    edit: Option<i32>,
    delete: Option<i32>,
) -> Result<Page, Status> {
    let mut conn = connection(state)?;

    if let Some(id) = delete {
        let result = crud::remove::<ProductRow>(&mut conn, &state.audit, &staff.audit, id);
        return removed_redirect(result, "/stock");
    }

    let editing = edit.map_or(Editing::Nothing, Editing::Product);
    render_stock(&mut conn, state, &staff, mark, flash, search, editing)
}

#[get("/stock/categories?<edit>&<delete>")]
pub fn categories_page(
    staff: AssistantUser,
    state: &State<AppState>,
    mark: &ViewMark,
    flash: Option<FlashMessage<'_>>,
    edit: Option<i32>,
    delete: Option<i32>,
) -> Result<Page, Status> {
    let mut conn = connection(state)?;

    if let Some(id) = delete {
        let result = crud::remove::<Category>(&mut conn, &state.audit, &staff.audit, id);
        return removed_redirect(result, "/stock");
    }

    let editing = edit.map_or(Editing::Nothing, Editing::Category);
    render_stock(&mut conn, state, &staff, mark, flash, None, editing)
}

#[get("/stock/suppliers?<edit>&<delete>")]
pub fn suppliers_page(
    staff: AssistantUser,
    state: &State<AppState>,
    mark: &ViewMark,
    flash: Option<FlashMessage<'_>>,
    edit: Option<i32>,
    delete: Option<i32>,
) -> Result<Page, Status> {
    let mut conn = connection(state)?;

    if let Some(id) = delete {
        let result = crud::remove::<Supplier>(&mut conn, &state.audit, &staff.audit, id);
        return removed_redirect(result, "/stock");
    }

    let editing = edit.map_or(Editing::Nothing, Editing::Supplier);
    render_stock(&mut conn, state, &staff, mark, flash, None, editing)
}

/// Saves a product; a quantity at or below the alert threshold is logged too.
#[post("/stock", data = "<form>")]
pub fn save_product(
    staff: AssistantUser,
    state: &State<AppState>,
    form: Form<ProductForm>,
) -> Result<Flash<Redirect>, Status> {
    let mut conn = connection(state)?;
    let result = crud::save::<ProductRow, _>(&mut conn, &state.audit, &staff.audit, form.into_inner());

    if let Ok(saved) = &result {
        let threshold = state.settings.stock_alert_threshold;
        let product = &saved.record().product;
        if saved.record().is_low(threshold) {
            state.audit.log_stock_alert(&staff.audit, &product.name, product.quantity, threshold);
        }
    }
    saved_redirect(result, "/stock")
}

#[post("/stock/categories", data = "<form>")]
pub fn save_category(
    staff: AssistantUser,
    state: &State<AppState>,
    form: Form<CategoryForm>,
) -> Result<Flash<Redirect>, Status> {
    let mut conn = connection(state)?;
    let result = crud::save::<Category, _>(&mut conn, &state.audit, &staff.audit, form.into_inner());
    saved_redirect(result, "/stock")
}

#[post("/stock/suppliers", data = "<form>")]
pub fn save_supplier(
    staff: AssistantUser,
    state: &State<AppState>,
    form: Form<SupplierForm>,
) -> Result<Flash<Redirect>, Status> {
    let mut conn = connection(state)?;
    let result = crud::save::<Supplier, _>(&mut conn, &state.audit, &staff.audit, form.into_inner());
    saved_redirect(result, "/stock")
}
