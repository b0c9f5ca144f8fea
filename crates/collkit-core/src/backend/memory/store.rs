use crate::backend::store::{
    AccessRules, FindOptions, Modifier, MutationKind, Selector, SortDirection, Store,
    StoreCapabilities, StoreError,
};
use collkit_schema::{
    PATH_SEPARATOR,
    value::{Document, Value, document_path},
};
use std::{cmp::Ordering, collections::BTreeMap, sync::RwLock};
use ulid::Ulid;

///
/// MemoryStore
///
/// In-process document collection keyed by a text id. Each update runs
/// under the write lock, so single-document modifiers are atomic.
///

#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    id_field: String,
    docs: RwLock<BTreeMap<String, Document>>,
    allow: RwLock<Vec<AccessRules>>,
    deny: RwLock<Vec<AccessRules>>,
    atomic_remove_at: bool,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_field: "_id".to_string(),
            docs: RwLock::new(BTreeMap::new()),
            allow: RwLock::new(Vec::new()),
            deny: RwLock::new(Vec::new()),
            atomic_remove_at: true,
        }
    }

    #[must_use]
    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    /// Advertise no atomic element removal, forcing callers onto their
    /// read-modify-write path.
    #[must_use]
    pub const fn without_atomic_remove_at(mut self) -> Self {
        self.atomic_remove_at = false;
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.read().expect("store lock should not be poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Document> {
        self.docs
            .read()
            .expect("store lock should not be poisoned")
            .get(id)
            .cloned()
    }

    fn permitted(&self, kind: MutationKind, user_id: Option<&str>, doc: &Document) -> bool {
        let passes = |rules: &[AccessRules]| {
            rules
                .iter()
                .any(|r| r.get(kind).is_some_and(|rule| rule(user_id, doc)))
        };

        let allowed = passes(&self.allow.read().expect("allow lock should not be poisoned"));
        let denied = passes(&self.deny.read().expect("deny lock should not be poisoned"));

        allowed && !denied
    }

    fn denied(&self, op: MutationKind) -> StoreError {
        StoreError::AccessDenied {
            op,
            collection: self.name.clone(),
        }
    }
}

impl Store for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn id_field(&self) -> &str {
        &self.id_field
    }

    fn query(&self, selector: &Selector, options: &FindOptions) -> Result<Vec<Document>, StoreError> {
        let docs = self.docs.read().expect("store lock should not be poisoned");
        let mut found: Vec<&Document> = docs.values().filter(|d| selector.matches(d)).collect();

        if !options.sort.is_empty() {
            found.sort_by(|a, b| {
                options
                    .sort
                    .iter()
                    .map(|(path, dir)| {
                        let ord = compare(document_path(a, path), document_path(b, path));
                        match dir {
                            SortDirection::Asc => ord,
                            SortDirection::Desc => ord.reverse(),
                        }
                    })
                    .find(|ord| ord.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }

        let limit = options.limit.unwrap_or(usize::MAX);
        let out = found
            .into_iter()
            .skip(options.skip)
            .take(limit)
            .map(|doc| match &options.fields {
                Some(fields) => doc
                    .iter()
                    .filter(|(k, _)| **k == self.id_field || fields.contains(*k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                None => doc.clone(),
            })
            .collect();

        Ok(out)
    }

    fn insert(&self, mut doc: Document) -> Result<String, StoreError> {
        let id = match doc.get(&self.id_field) {
            Some(Value::Text(id)) => id.clone(),
            _ => {
                let id = Ulid::new().to_string();
                doc.insert(self.id_field.clone(), Value::Text(id.clone()));
                id
            }
        };

        let mut docs = self.docs.write().expect("store lock should not be poisoned");
        if docs.contains_key(&id) {
            return Err(StoreError::DuplicateId(id));
        }
        docs.insert(id.clone(), doc);

        Ok(id)
    }

    fn update(&self, id: &str, modifier: &Modifier) -> Result<usize, StoreError> {
        let mut docs = self.docs.write().expect("store lock should not be poisoned");
        let Some(doc) = docs.get_mut(id) else {
            return Ok(0);
        };

        // apply to a copy so a failing modifier leaves the document intact
        let mut next = doc.clone();
        apply_modifier(&mut next, modifier)?;
        *doc = next;

        Ok(1)
    }

    fn remove(&self, id: &str) -> Result<usize, StoreError> {
        let mut docs = self.docs.write().expect("store lock should not be poisoned");
        Ok(usize::from(docs.remove(id).is_some()))
    }

    fn allow(&self, rules: AccessRules) {
        self.allow
            .write()
            .expect("allow lock should not be poisoned")
            .push(rules);
    }

    fn deny(&self, rules: AccessRules) {
        self.deny
            .write()
            .expect("deny lock should not be poisoned")
            .push(rules);
    }

    fn client_insert(&self, user_id: Option<&str>, doc: Document) -> Result<String, StoreError> {
        if !self.permitted(MutationKind::Insert, user_id, &doc) {
            return Err(self.denied(MutationKind::Insert));
        }

        self.insert(doc)
    }

    fn client_update(&self, user_id: Option<&str>, id: &str, modifier: &Modifier) -> Result<usize, StoreError> {
        let Some(current) = self.get(id) else {
            return Ok(0);
        };
        if !self.permitted(MutationKind::Update, user_id, &current) {
            return Err(self.denied(MutationKind::Update));
        }

        self.update(id, modifier)
    }

    fn client_remove(&self, user_id: Option<&str>, id: &str) -> Result<usize, StoreError> {
        let Some(current) = self.get(id) else {
            return Ok(0);
        };
        if !self.permitted(MutationKind::Remove, user_id, &current) {
            return Err(self.denied(MutationKind::Remove));
        }

        self.remove(id)
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            atomic_remove_at: self.atomic_remove_at,
        }
    }
}

///
/// Modifier application
///

fn apply_modifier(doc: &mut Document, modifier: &Modifier) -> Result<(), StoreError> {
    match modifier {
        Modifier::Set(fields) => {
            for (path, value) in fields {
                let slot = descend_mut(doc, path, true)?
                    .ok_or_else(|| invalid(path, "empty path"))?;
                *slot = value.clone();
            }
        }

        Modifier::Unset(paths) => {
            for path in paths {
                unset(doc, path)?;
            }
        }

        Modifier::Push { path, value } => {
            let slot = descend_mut(doc, path, true)?.ok_or_else(|| invalid(path, "empty path"))?;
            if slot.is_null() {
                *slot = Value::List(Vec::new());
            }
            match slot {
                Value::List(items) => items.push(value.clone()),
                other => return Err(invalid(path, format!("cannot push onto {}", other.type_name()))),
            }
        }

        Modifier::RemoveAt { path, index } => match descend_mut(doc, path, false)? {
            Some(Value::List(items)) if *index < items.len() => {
                items.remove(*index);
            }
            Some(Value::List(items)) => {
                return Err(invalid(
                    path,
                    format!("index {index} out of bounds for length {}", items.len()),
                ));
            }
            Some(other) => {
                return Err(invalid(path, format!("expected list, found {}", other.type_name())));
            }
            None => return Err(invalid(path, "no list at path")),
        },
    }

    Ok(())
}

// Walk to the value at `path`. With `create`, missing map entries are
// created (nulls become maps); list indexes are never created.
fn descend_mut<'a>(
    doc: &'a mut Document,
    path: &str,
    create: bool,
) -> Result<Option<&'a mut Value>, StoreError> {
    let mut segments = path.split(PATH_SEPARATOR);
    let Some(first) = segments.next().filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    let mut cur = if create {
        doc.entry(first.to_string()).or_insert(Value::Null)
    } else {
        match doc.get_mut(first) {
            Some(v) => v,
            None => return Ok(None),
        }
    };

    for seg in segments {
        if create && cur.is_null() {
            *cur = Value::map();
        }

        cur = match cur {
            Value::Map(map) => {
                if create {
                    map.entry(seg.to_string()).or_insert(Value::Null)
                } else {
                    match map.get_mut(seg) {
                        Some(v) => v,
                        None => return Ok(None),
                    }
                }
            }
            Value::List(items) => match seg.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                Some(v) => v,
                None if create => return Err(invalid(path, format!("no list element '{seg}'"))),
                None => return Ok(None),
            },
            other if create => {
                return Err(invalid(
                    path,
                    format!("cannot descend into {}", other.type_name()),
                ));
            }
            _ => return Ok(None),
        };
    }

    Ok(Some(cur))
}

fn unset(doc: &mut Document, path: &str) -> Result<(), StoreError> {
    let Some((parent, last)) = path.rsplit_once(PATH_SEPARATOR) else {
        doc.remove(path);
        return Ok(());
    };

    match descend_mut(doc, parent, false)? {
        Some(Value::Map(map)) => {
            map.remove(last);
        }
        // list elements are nulled, not removed, so sibling indexes hold
        Some(Value::List(items)) => {
            if let Some(item) = last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                *item = Value::Null;
            }
        }
        Some(_) | None => {}
    }

    Ok(())
}

fn invalid(path: &str, reason: impl Into<String>) -> StoreError {
    StoreError::InvalidModifier {
        path: path.to_string(),
        reason: reason.into(),
    }
}

// null < numbers < text < map < list < bool < date
const fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Int(_) | Value::Float(_)) => 1,
        Some(Value::Text(_)) => 2,
        Some(Value::Map(_)) => 3,
        Some(Value::List(_)) => 4,
        Some(Value::Bool(_)) => 5,
        Some(Value::Date(_)) => 6,
    }
}

#[expect(clippy::cast_precision_loss)]
fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Int(x)), Some(Value::Int(y))) => x.cmp(y),
        (Some(Value::Int(x)), Some(Value::Float(y))) => (*x as f64).total_cmp(y),
        (Some(Value::Float(x)), Some(Value::Int(y))) => x.total_cmp(&(*y as f64)),
        (Some(Value::Float(x)), Some(Value::Float(y))) => x.total_cmp(y),
        (Some(Value::Text(x)), Some(Value::Text(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Date(x)), Some(Value::Date(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
