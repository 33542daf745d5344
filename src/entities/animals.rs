use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;

use crate::crud::{self, CrudError, Resource, ResourceForm};
use crate::db::last_insert_id;
use crate::models::{Animal, AnimalInput};
use crate::schema::{animals, clients};

/// An animal with its owner's name.
#[derive(Debug, Clone, Serialize)]
pub struct AnimalRow {
    #[serde(flatten)]
    pub animal: Animal,
    pub owner_first_name: String,
    pub owner_last_name: String,
}

impl AnimalRow {
    pub fn owner(&self) -> String {
        format!("{} {}", self.owner_first_name, self.owner_last_name)
    }
}

#[derive(Debug, FromForm)]
pub struct AnimalForm {
    pub edit_id: Option<i32>,
    pub name: Option<String>,
    pub species: Option<String>,
    pub breed: Option<String>,
    pub age: Option<String>,
    pub client: Option<String>,
}

impl ResourceForm for AnimalForm {
    type Input = AnimalInput;

    fn edit_id(&self) -> Option<i32> {
        self.edit_id
    }

    fn validate(self, _editing: bool) -> Result<AnimalInput, CrudError> {
        let age: i32 = crud::required_parse(self.age, "Age")?;
        if age < 0 {
            return Err(CrudError::invalid("Age cannot be negative."));
        }
        Ok(AnimalInput {
            name: crud::required(self.name, "Name")?,
            species: crud::required(self.species, "Type")?,
            breed: crud::required(self.breed, "Breed")?,
            age,
            client_id: crud::required_parse(self.client, "Client")?,
        })
    }
}

fn owner_exists(conn: &mut SqliteConnection, client_id: i32) -> Result<(), CrudError> {
    let found: i64 = clients::table
        .filter(clients::id.eq(client_id))
        .count()
        .get_result(conn)?;
    if found == 0 {
        return Err(CrudError::invalid("Selected client does not exist."));
    }
    Ok(())
}

type RowTuple = (Animal, String, String);

fn into_row((animal, owner_first_name, owner_last_name): RowTuple) -> AnimalRow {
    AnimalRow { animal, owner_first_name, owner_last_name }
}

impl Resource for AnimalRow {
    type Input = AnimalInput;

    const ENTITY: &'static str = "Animal";
    const CSV_HEADER: &'static [&'static str] = &["Name", "Type", "Breed", "Age", "Client"];

    fn list(conn: &mut SqliteConnection) -> QueryResult<Vec<Self>> {
        let rows = animals::table
            .inner_join(clients::table)
            .order(animals::name.asc())
            .select((Animal::as_select(), clients::first_name, clients::last_name))
            .load::<RowTuple>(conn)?;
        Ok(rows.into_iter().map(into_row).collect())
    }

    fn find(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Self>> {
        let row = animals::table
            .inner_join(clients::table)
            .filter(animals::id.eq(id))
            .select((Animal::as_select(), clients::first_name, clients::last_name))
            .first::<RowTuple>(conn)
            .optional()?;
        Ok(row.map(into_row))
    }

    fn insert(conn: &mut SqliteConnection, input: &AnimalInput) -> Result<i32, CrudError> {
        owner_exists(conn, input.client_id)?;
        diesel::insert_into(animals::table).values(input).execute(conn)?;
        Ok(last_insert_id(conn)?)
    }

    fn update(conn: &mut SqliteConnection, id: i32, input: &AnimalInput) -> Result<usize, CrudError> {
        owner_exists(conn, input.client_id)?;
        Ok(diesel::update(animals::table.find(id)).set(input).execute(conn)?)
    }

    fn delete(conn: &mut SqliteConnection, id: i32) -> QueryResult<usize> {
        diesel::delete(animals::table.find(id)).execute(conn)
    }

    fn id(&self) -> i32 {
        self.animal.id
    }

    fn label(&self) -> String {
        self.animal.name.clone()
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.animal.name.as_str(),
            self.animal.species.as_str(),
            self.animal.breed.as_str(),
            self.owner_first_name.as_str(),
            self.owner_last_name.as_str(),
        ]
    }

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.animal.name.clone(),
            self.animal.species.clone(),
            self.animal.breed.clone(),
            self.animal.age.to_string(),
            self.owner(),
        ]
    }
}
