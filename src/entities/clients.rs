use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use crate::crud::{self, CrudError, Resource, ResourceForm};
use crate::db::last_insert_id;
use crate::models::{Client, ClientInput};
use crate::schema::clients;

#[derive(Debug, FromForm)]
pub struct ClientForm {
    pub edit_id: Option<i32>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl ResourceForm for ClientForm {
    type Input = ClientInput;

    fn edit_id(&self) -> Option<i32> {
        self.edit_id
    }

    fn validate(self, _editing: bool) -> Result<ClientInput, CrudError> {
        let email = crud::required(self.email, "Email")?;
        if !email.contains('@') {
            return Err(CrudError::invalid("Email is not a valid address."));
        }
        Ok(ClientInput {
            first_name: crud::required(self.first_name, "First name")?,
            last_name: crud::required(self.last_name, "Last name")?,
            phone: crud::required(self.phone, "Phone")?,
            email,
        })
    }
}

impl Resource for Client {
    type Input = ClientInput;

    const ENTITY: &'static str = "Client";
    const CSV_HEADER: &'static [&'static str] = &["First Name", "Last Name", "Phone", "Email"];

    fn list(conn: &mut SqliteConnection) -> QueryResult<Vec<Self>> {
        clients::table
            .order((clients::last_name.asc(), clients::first_name.asc()))
            .select(Client::as_select())
            .load(conn)
    }

    fn find(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Self>> {
        clients::table
            .find(id)
            .select(Client::as_select())
            .first(conn)
            .optional()
    }

    fn insert(conn: &mut SqliteConnection, input: &ClientInput) -> Result<i32, CrudError> {
        diesel::insert_into(clients::table).values(input).execute(conn)?;
        Ok(last_insert_id(conn)?)
    }

    fn update(conn: &mut SqliteConnection, id: i32, input: &ClientInput) -> Result<usize, CrudError> {
        Ok(diesel::update(clients::table.find(id)).set(input).execute(conn)?)
    }

    fn delete(conn: &mut SqliteConnection, id: i32) -> QueryResult<usize> {
        diesel::delete(clients::table.find(id)).execute(conn)
    }

    fn id(&self) -> i32 {
        self.id
    }

    fn label(&self) -> String {
        self.full_name()
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.last_name.as_str(),
            self.first_name.as_str(),
            self.phone.as_str(),
            self.email.as_str(),
        ]
    }

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.first_name.clone(),
            self.last_name.clone(),
            self.phone.clone(),
            self.email.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::testing::memory_logger;
    use crate::audit::{Actor, AuditContext};
    use crate::crud::Saved;
    use crate::db::testing::temp_pool;

    fn form(first: &str, last: &str) -> ClientForm {
        ClientForm {
            edit_id: None,
            first_name: Some(first.into()),
            last_name: Some(last.into()),
            phone: Some("0600000000".into()),
            email: Some(format!("{}@example.com", first.to_lowercase())),
        }
    }

    fn ctx() -> AuditContext {
        AuditContext::default().with_actor(Actor { id: 1, username: "admin".into() })
    }

    #[test]
    fn each_mutation_writes_one_matching_event() {
        let (pool, _dir) = temp_pool();
        let mut conn = pool.get().unwrap();
        let (logger, sink) = memory_logger();

        let created = match crud::save::<Client, _>(&mut conn, &logger, &ctx(), form("Jane", "Doe")).unwrap() {
            Saved::Created(c) => c,
            Saved::Updated(_) => panic!("expected create"),
        };

        let mut edit = form("Janet", "Doe");
        edit.edit_id = Some(created.id);
        crud::save::<Client, _>(&mut conn, &logger, &ctx(), edit).unwrap();
        crud::remove::<Client>(&mut conn, &logger, &ctx(), created.id).unwrap();

        assert_eq!(sink.actions(), vec!["create", "update", "delete"]);
        let events = sink.events.lock().unwrap();
        assert_eq!(events[0].description, "Created Client: Jane Doe");
        assert_eq!(events[1].description, "Updated Client: Janet Doe");
        assert!(events.iter().all(|e| e.target_id == Some(created.id)));
        assert!(events.iter().all(|e| e.target_entity.as_deref() == Some("Client")));
    }

    #[test]
    fn invalid_form_writes_nothing() {
        let (pool, _dir) = temp_pool();
        let mut conn = pool.get().unwrap();
        let (logger, sink) = memory_logger();

        let mut bad = form("Jane", "Doe");
        bad.phone = Some("  ".into());
        let err = crud::save::<Client, _>(&mut conn, &logger, &ctx(), bad).err().unwrap();

        assert!(matches!(err, CrudError::Validation(_)));
        assert!(sink.actions().is_empty());
        assert!(Client::list(&mut conn).unwrap().is_empty());
    }

    #[test]
    fn missing_ids_are_not_found() {
        let (pool, _dir) = temp_pool();
        let mut conn = pool.get().unwrap();
        let (logger, sink) = memory_logger();

        let mut edit = form("Jane", "Doe");
        edit.edit_id = Some(99);
        assert!(matches!(
            crud::save::<Client, _>(&mut conn, &logger, &ctx(), edit),
            Err(CrudError::NotFound)
        ));
        assert!(matches!(
            crud::remove::<Client>(&mut conn, &logger, &ctx(), 99),
            Err(CrudError::NotFound)
        ));
        assert!(sink.actions().is_empty());
    }

    #[test]
    fn csv_has_header_and_one_row_per_client() {
        let (pool, _dir) = temp_pool();
        let mut conn = pool.get().unwrap();
        let (logger, sink) = memory_logger();
        crud::save::<Client, _>(&mut conn, &logger, &ctx(), form("Jane", "Doe")).unwrap();
        crud::save::<Client, _>(&mut conn, &logger, &ctx(), form("John", "Smith")).unwrap();

        let csv = crud::export::<Client>(&mut conn, &logger, &ctx(), None).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "First Name,Last Name,Phone,Email");
        assert_eq!(lines.len(), 3);
        assert!(lines.contains(&"Jane,Doe,0600000000,jane@example.com"));
        assert_eq!(sink.actions().last().map(String::as_str), Some("export"));
    }

    #[test]
    fn search_narrows_the_listing() {
        let (pool, _dir) = temp_pool();
        let mut conn = pool.get().unwrap();
        let (logger, _sink) = memory_logger();
        crud::save::<Client, _>(&mut conn, &logger, &ctx(), form("Jane", "Doe")).unwrap();
        crud::save::<Client, _>(&mut conn, &logger, &ctx(), form("John", "Smith")).unwrap();

        let found = crud::search::<Client>(&mut conn, Some("smi")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].first_name, "John");
        assert_eq!(crud::search::<Client>(&mut conn, Some("  ")).unwrap().len(), 2);
    }
}
