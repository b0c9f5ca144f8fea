#![allow(dead_code)]

use collkit::{
    CollectionTools, Error, ToolsConfig,
    backend::{CallContext, Database, FeedContext, Selector},
    memory::{MemoryDatabase, MemoryRateLimiter, MemoryTransport},
    prelude::*,
};
use std::sync::Arc;

///
/// Harness
///
/// In-memory database, transport and rate limiter wired into one
/// orchestrator.
///

pub struct Harness {
    pub db: Arc<MemoryDatabase>,
    pub transport: Arc<MemoryTransport>,
    pub limiter: Arc<MemoryRateLimiter>,
    pub tools: CollectionTools,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_transport(MemoryTransport::new())
    }

    pub fn pure_client() -> Self {
        Self::with_transport(MemoryTransport::pure_client())
    }

    pub fn with_config(config: ToolsConfig) -> Self {
        let mut harness = Self::new();
        harness.tools = harness.tools.clone().with_config(config);
        harness
    }

    fn with_transport(transport: MemoryTransport) -> Self {
        let db = Arc::new(MemoryDatabase::new());
        let limiter = Arc::new(MemoryRateLimiter::new());
        let transport = Arc::new(transport.with_rate_limiter(limiter.clone()));
        let tools = CollectionTools::new(db.clone(), transport.clone(), limiter.clone());

        Self {
            db,
            transport,
            limiter,
            tools,
        }
    }

    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, Error> {
        self.call_as(None, name, args)
    }

    pub fn call_as(&self, user: Option<&str>, name: &str, args: Vec<Value>) -> Result<Value, Error> {
        self.transport
            .call(name, &CallContext::new(user, Some("conn-1")), args)
    }

    pub fn subscribe(&self, ctx: &FeedContext, name: &str, args: Vec<Value>) -> Result<Vec<Document>, Error> {
        Ok(self.transport.subscribe(name, ctx, args)?.fetch()?)
    }

    pub fn seed(&self, collection: &str, json: serde_json::Value) -> String {
        self.db
            .collection(collection)
            .insert(doc(json))
            .expect("seed insert should succeed")
    }

    pub fn load(&self, collection: &str, id: &str) -> Document {
        self.db
            .collection(collection)
            .find_one(&Selector::by_id("_id", id), &FindOptions::default())
            .expect("lookup should succeed")
            .expect("document should exist")
    }
}

pub fn doc(json: serde_json::Value) -> Document {
    let Value::Map(doc) = Value::from(json) else {
        panic!("fixture should be an object");
    };

    doc
}

/// `name` (text, tagged) and `num` (number), both defaulted.
pub fn thing_schema() -> Schema {
    Schema::builder()
        .field("name", FieldDescriptor::text().default_value("name").tag("basic"))
        .field("num", FieldDescriptor::number().default_value(42))
        .build()
        .expect("thing schema should be valid")
}

/// An order with an array of line items and a list of text tags.
pub fn order_schema() -> Schema {
    Schema::builder()
        .field("title", FieldDescriptor::text().default_value("untitled").tag("summary"))
        .field("total", FieldDescriptor::int().default_value(0).tag("summary"))
        .field("note", FieldDescriptor::text().optional())
        .field("items", FieldDescriptor::array().default_value(Value::List(Vec::new())))
        .field("items.$", FieldDescriptor::object())
        .field("items.$.sku", FieldDescriptor::text().default_value("sku"))
        .field("items.$.qty", FieldDescriptor::int().default_value(1))
        .array_of(
            "tags",
            Primitive::Text,
            FieldDescriptor::array().default_value(Value::List(Vec::new())),
        )
        .build()
        .expect("order schema should be valid")
}
