use datx::{Attribute, Cardinality, Collection, DateCodec, Field, Model, Record, Schema};

/// Event <-> Person <-> Pet: to-one, to-many, a computed inverse and a date attribute.
pub fn collection() -> Collection {
    let collection = Collection::new();
    collection.register(Person::schema());
    collection.register(
        Schema::new("pet")
            .attribute("name")
            .field(Field::to_one("owner", "person").inverse("pets", Cardinality::Many)),
    );
    collection.register(
        Schema::new("event")
            .attribute("title")
            .attribute_with("date", Attribute::new().codec(DateCodec))
            .to_one("responsible", "person")
            .to_many("organizers", "person"),
    );
    collection.register(
        Schema::new("list")
            .attribute("name")
            .to_many("items", "item"),
    );
    collection.register(
        Schema::new("item")
            .attribute("label")
            .inverse_one("owner", "list", "items"),
    );
    collection
}

pub struct Person(Model);

impl Person {
    pub fn name(&self) -> Option<String> {
        self.0.get("name")
    }
}

impl Record for Person {
    const TYPE: &'static str = "person";

    fn schema() -> Schema {
        Schema::new(Self::TYPE).attribute("name").attribute("age")
    }

    fn wrap(model: Model) -> Self {
        Person(model)
    }

    fn model(&self) -> &Model {
        &self.0
    }
}
