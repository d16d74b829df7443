/// Shared fixtures for the dynamap integration tests
///
/// Sample models covering the main shapes (hash key only, hash and range
/// key with an index, a polymorphic hierarchy), and a [`TestContext`] that
/// installs a fresh in-memory executor for the current thread.

use dmap::{
    Document, DocumentExt, ExecutorGuard, FieldDef, FieldType, MemoryExecutor, Model, ModelDefinition, ModelSchema,
    Result, SchemaCell, TableConfig,
};
use dmap_core::memory::Request;
use std::collections::BTreeSet;
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// Installs a test-writer subscriber once per process; `RUST_LOG` controls the level.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A fresh in-memory store with the sample tables, installed as this
/// thread's executor until the context drops.
pub struct TestContext {
    pub executor: MemoryExecutor,
    _guard: ExecutorGuard,
}

impl TestContext {
    pub fn new() -> Self {
        init_tracing();
        register_animals();

        let executor = MemoryExecutor::new();
        for schema in [User::schema(), Message::schema(), Animal::schema()] {
            executor.create_table_for(&schema.expect("sample schema builds"));
        }
        let guard = ExecutorGuard::push(Arc::new(executor.clone()));
        Self {
            executor,
            _guard: guard,
        }
    }

    pub fn requests(&self) -> Vec<Request> {
        self.executor.requests()
    }

    pub fn request_count(&self) -> usize {
        self.executor.request_count()
    }

    pub fn last_request(&self) -> Option<Request> {
        self.executor.requests().pop()
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Asserts that `result` failed with the given error code.
#[track_caller]
pub fn assert_error_code<T: std::fmt::Debug>(result: Result<T>, code: &str) {
    match result {
        Ok(value) => panic!("expected error {}, got Ok({:?})", code, value),
        Err(err) => assert_eq!(err.code(), code, "unexpected error: {}", err),
    }
}

/// Hash key only, with an optional field, a set and an alias.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub email: String,
    pub name: String,
    pub age: Option<i64>,
    pub org: Option<String>,
    pub tags: BTreeSet<String>,
}

impl User {
    pub fn new(email: &str, name: &str) -> Self {
        Self {
            email: email.to_string(),
            name: name.to_string(),
            age: None,
            org: None,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_age(mut self, age: i64) -> Self {
        self.age = Some(age);
        self
    }

    pub fn with_org(mut self, org: &str) -> Self {
        self.org = Some(org.to_string());
        self
    }
}

impl Model for User {
    fn schema() -> Result<Arc<ModelSchema>> {
        static SCHEMA: SchemaCell = SchemaCell::new();
        SCHEMA.get_or_init(|| {
            ModelDefinition::new("User")
                .config(TableConfig::new("users"))
                .field(FieldDef::new("email", FieldType::Str).primary_key())
                .field(FieldDef::new("name", FieldType::Str).alias("full_name"))
                .field(FieldDef::new("age", FieldType::optional(FieldType::Int)))
                .field(FieldDef::new("org", FieldType::optional(FieldType::Str)).gsi_partition_key("by_org"))
                .field(FieldDef::new("tags", FieldType::StrSet))
                .build()
        })
    }

    fn to_document(&self) -> Result<Document> {
        let mut doc = Document::new();
        doc.put("email", self.email.clone());
        doc.put("name", self.name.clone());
        doc.put("age", self.age);
        doc.put("org", self.org.clone());
        doc.put("tags", self.tags.clone());
        Ok(doc)
    }

    fn from_document(mut doc: Document) -> Result<Self> {
        Ok(Self {
            email: doc.take("email")?,
            name: doc.take("name")?,
            age: doc.take_opt("age")?,
            org: doc.take_opt("org")?,
            tags: doc.take_opt("tags")?.unwrap_or_default(),
        })
    }
}

/// Hash and range key, with an index keyed by author.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub room_id: String,
    pub timestamp: i64,
    pub author: String,
    pub body: String,
}

impl Message {
    pub fn new(room_id: &str, timestamp: i64, author: &str, body: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            timestamp,
            author: author.to_string(),
            body: body.to_string(),
        }
    }
}

impl Model for Message {
    fn schema() -> Result<Arc<ModelSchema>> {
        static SCHEMA: SchemaCell = SchemaCell::new();
        SCHEMA.get_or_init(|| {
            ModelDefinition::new("Message")
                .config(TableConfig::new("messages"))
                .field(FieldDef::new("room_id", FieldType::Str).primary_key())
                .field(FieldDef::new("timestamp", FieldType::Int).sort_key().gsi_sort_key("by_author"))
                .field(FieldDef::new("author", FieldType::Str).gsi_partition_key("by_author"))
                .field(FieldDef::new("body", FieldType::Str))
                .build()
        })
    }

    fn to_document(&self) -> Result<Document> {
        let mut doc = Document::new();
        doc.put("room_id", self.room_id.clone());
        doc.put("timestamp", self.timestamp);
        doc.put("author", self.author.clone());
        doc.put("body", self.body.clone());
        Ok(doc)
    }

    fn from_document(mut doc: Document) -> Result<Self> {
        Ok(Self {
            room_id: doc.take("room_id")?,
            timestamp: doc.take("timestamp")?,
            author: doc.take("author")?,
            body: doc.take("body")?,
        })
    }
}

/// Polymorphic base; `kind` is stored as `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum Animal {
    Other { id: String, name: String, kind: Option<String> },
    Dog(Dog),
    Cat(Cat),
}

impl Model for Animal {
    fn schema() -> Result<Arc<ModelSchema>> {
        static SCHEMA: SchemaCell = SchemaCell::new();
        SCHEMA.get_or_init(|| {
            ModelDefinition::new("Animal")
                .config(TableConfig::new("animals"))
                .field(FieldDef::new("id", FieldType::Str).primary_key())
                .field(FieldDef::new("kind", FieldType::optional(FieldType::Str)).alias("type").discriminator())
                .field(FieldDef::new("name", FieldType::Str))
                .build()
        })
    }

    fn to_document(&self) -> Result<Document> {
        match self {
            Animal::Other { id, name, kind } => {
                let mut doc = Document::new();
                doc.put("id", id.clone());
                doc.put("name", name.clone());
                doc.put("kind", kind.clone());
                Ok(doc)
            }
            Animal::Dog(dog) => {
                let mut doc = dog.to_document()?;
                doc.put("kind", "dog");
                Ok(doc)
            }
            Animal::Cat(cat) => {
                let mut doc = cat.to_document()?;
                doc.put("kind", "cat");
                Ok(doc)
            }
        }
    }

    fn from_document(mut doc: Document) -> Result<Self> {
        Ok(Animal::Other {
            id: doc.take("id")?,
            name: doc.take("name")?,
            kind: doc.take_opt("kind")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dog {
    pub id: String,
    pub name: String,
    pub breed: String,
}

impl From<Dog> for Animal {
    fn from(dog: Dog) -> Self {
        Animal::Dog(dog)
    }
}

impl Model for Dog {
    fn schema() -> Result<Arc<ModelSchema>> {
        static SCHEMA: SchemaCell = SchemaCell::new();
        SCHEMA.get_or_init(|| {
            dmap::register::<Animal, Dog>(
                "dog",
                ModelDefinition::new("Dog")
                    .extends(&Animal::schema()?)
                    .field(FieldDef::new("breed", FieldType::Str)),
            )
        })
    }

    fn to_document(&self) -> Result<Document> {
        let mut doc = Document::new();
        doc.put("id", self.id.clone());
        doc.put("name", self.name.clone());
        doc.put("breed", self.breed.clone());
        Ok(doc)
    }

    fn from_document(mut doc: Document) -> Result<Self> {
        Ok(Self {
            id: doc.take("id")?,
            name: doc.take("name")?,
            breed: doc.take("breed")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cat {
    pub id: String,
    pub name: String,
    pub lives: i64,
}

impl From<Cat> for Animal {
    fn from(cat: Cat) -> Self {
        Animal::Cat(cat)
    }
}

impl Model for Cat {
    fn schema() -> Result<Arc<ModelSchema>> {
        static SCHEMA: SchemaCell = SchemaCell::new();
        SCHEMA.get_or_init(|| {
            dmap::register::<Animal, Cat>(
                "cat",
                ModelDefinition::new("Cat")
                    .extends(&Animal::schema()?)
                    .field(FieldDef::new("lives", FieldType::Int).default(9)),
            )
        })
    }

    fn to_document(&self) -> Result<Document> {
        let mut doc = Document::new();
        doc.put("id", self.id.clone());
        doc.put("name", self.name.clone());
        doc.put("lives", self.lives);
        Ok(doc)
    }

    fn from_document(mut doc: Document) -> Result<Self> {
        Ok(Self {
            id: doc.take("id")?,
            name: doc.take("name")?,
            lives: doc.take("lives")?,
        })
    }
}

/// Subtype schemas register themselves on first use; touch them up front so
/// reads through [`Animal`] can resolve every kind.
pub fn register_animals() {
    Dog::schema().expect("Dog registers");
    Cat::schema().expect("Cat registers");
}
