//! Uniform read/write/observe access to a value, whatever stores it.
//!
//! A [`FieldRef`] is bound for life to one [`Binding`]: a shared
//! [`Field`], a field of a [`DatabaseObject`], a BLOB, a getter/setter pair
//! or a stored variable. Setting a value through it notifies subscribers,
//! except those registered under the [`Originator`] that made the change.
//!
//! Callbacks run after every internal lock has been released, so they may
//! read the `FieldRef` (and the object behind it) freely.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::blob::Blob;
use crate::error::{DatabaseError, DatabaseResult};
use crate::field::Field;
use crate::object::{DatabaseObject, DatabaseObjectPtr};
use crate::stored_var::StoredVarStore;
use crate::value::Value;

pub type FieldRefPtr = Arc<FieldRef>;
pub type Getter = Box<dyn Fn() -> Value + Send + Sync>;
pub type Setter = Box<dyn Fn(Value) -> bool + Send + Sync>;
pub type FieldRefCallback = Arc<dyn Fn(&FieldRef, &FieldRefEvent) + Send + Sync>;

/// Identifies whoever made a change, so it can ignore its own echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Originator(u64);

impl Originator {
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for Originator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRefSignal {
    ValueChanged,
    MandatoryChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRefEvent {
    pub signal: FieldRefSignal,
    pub originator: Option<Originator>,
}

pub enum Binding {
    Field(Arc<Mutex<Field>>),
    Record {
        object: Weak<Mutex<DatabaseObject>>,
        fieldname: String,
        autosave: bool,
    },
    /// BLOB owned by a record; the record's field holds the BLOB's PK.
    RecordBlob {
        object: Weak<Mutex<DatabaseObject>>,
        fieldname: String,
        blob: Mutex<Blob>,
    },
    /// BLOB with no owning record, e.g. a specimen for widget testing.
    IsolatedBlob(Mutex<Blob>),
    Closures {
        getter: Getter,
        setter: Setter,
    },
    StoredVar {
        store: Arc<StoredVarStore>,
        name: String,
        cached: bool,
    },
}

impl Binding {
    fn method_description(&self) -> &'static str {
        match self {
            Binding::Field(_) => "Field",
            Binding::Record { .. } => "DatabaseObject",
            Binding::RecordBlob { .. } => "DatabaseObjectBlobField",
            Binding::IsolatedBlob(_) => "IsolatedBlobFieldForTesting",
            Binding::Closures { .. } => "Functions",
            Binding::StoredVar { cached: false, .. } => "StoredVar",
            Binding::StoredVar { cached: true, .. } => "CachedStoredVar",
        }
    }
}

struct Subscriber {
    id: SubscriptionId,
    originator: Option<Originator>,
    callback: FieldRefCallback,
}

struct State {
    mandatory: bool,
    hint: Value,
    subscribers: Vec<Subscriber>,
    next_subscription: u64,
}

pub struct FieldRef {
    binding: Binding,
    state: Mutex<State>,
}

impl FieldRef {
    fn with_binding(binding: Binding, mandatory: bool) -> Self {
        Self {
            binding,
            state: Mutex::new(State {
                mandatory,
                hint: Value::Null,
                subscribers: Vec::new(),
                next_subscription: 1,
            }),
        }
    }

    pub fn for_field(field: Arc<Mutex<Field>>, mandatory: bool) -> Self {
        Self::with_binding(Binding::Field(field), mandatory)
    }

    /// Prefer [`DatabaseObject::field_ref`], which shares one `FieldRef`
    /// per field.
    pub fn for_record(
        object: Weak<Mutex<DatabaseObject>>,
        fieldname: &str,
        mandatory: bool,
        autosave: bool,
    ) -> Self {
        Self::with_binding(
            Binding::Record {
                object,
                fieldname: fieldname.to_string(),
                autosave,
            },
            mandatory,
        )
    }

    /// Saves the object to make sure it has a PK, then binds the BLOB for
    /// `fieldname`. Always autosaves.
    pub fn for_record_blob(
        object: &DatabaseObjectPtr,
        fieldname: &str,
        mandatory: bool,
    ) -> DatabaseResult<Self> {
        let (db, tablename, pk) = {
            let mut guard = object.lock();
            if !guard.save() {
                return Err(DatabaseError::InvalidQuery(format!(
                    "cannot save {} to obtain a PK for its BLOB",
                    guard.tablename()
                )));
            }
            (
                Arc::clone(guard.database()),
                guard.tablename().to_string(),
                guard.pk_value_int(),
            )
        };
        let blob = Blob::new(db, &tablename, pk, fieldname)?;
        Ok(Self::with_binding(
            Binding::RecordBlob {
                object: Arc::downgrade(object),
                fieldname: fieldname.to_string(),
                blob: Mutex::new(blob),
            },
            mandatory,
        ))
    }

    pub fn for_isolated_blob(blob: Blob, mandatory: bool) -> Self {
        warn!("FieldRef constructed with reference to specimen BLOB; for testing only");
        Self::with_binding(Binding::IsolatedBlob(Mutex::new(blob)), mandatory)
    }

    pub fn for_closures(getter: Getter, setter: Setter, mandatory: bool) -> Self {
        Self::with_binding(Binding::Closures { getter, setter }, mandatory)
    }

    /// A stored variable, or its edit buffer if `cached`.
    pub fn for_stored_var(store: Arc<StoredVarStore>, name: &str, mandatory: bool, cached: bool) -> Self {
        Self::with_binding(
            Binding::StoredVar {
                store,
                name: name.to_string(),
                cached,
            },
            mandatory,
        )
    }

    /// Whether the target still exists.
    pub fn valid(&self) -> bool {
        match &self.binding {
            Binding::Record { object, .. } | Binding::RecordBlob { object, .. } => {
                object.strong_count() > 0
            }
            Binding::StoredVar { store, name, .. } => store.has_var(name),
            Binding::Field(_) | Binding::IsolatedBlob(_) | Binding::Closures { .. } => true,
        }
    }

    // ------------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------------

    pub fn value(&self) -> Value {
        match &self.binding {
            Binding::Field(field) => field.lock().value().clone(),
            Binding::Record { object, fieldname, .. } => match object.upgrade() {
                Some(object) => object.lock().value(fieldname).clone(),
                None => Value::Null,
            },
            Binding::RecordBlob { blob, .. } | Binding::IsolatedBlob(blob) => {
                blob.lock().blob_value().clone()
            }
            Binding::Closures { getter, .. } => getter(),
            Binding::StoredVar { store, name, cached } => {
                let result = if *cached {
                    store.cached_var(name)
                } else {
                    store.var(name)
                };
                result.unwrap_or_else(|e| {
                    warn!(var = %name, error = %e, "Cannot read stored variable");
                    Value::Null
                })
            }
        }
    }

    /// Set the value, returning whether it changed. Subscribers hear of a
    /// change before any autosave happens.
    pub fn set_value(&self, value: impl Into<Value>, originator: Option<Originator>) -> DatabaseResult<bool> {
        let value = value.into();
        let changed = match &self.binding {
            Binding::Field(field) => field.lock().set_value(value)?,
            Binding::Record { object, fieldname, .. } => match object.upgrade() {
                Some(object) => object.lock().set_value(fieldname, value, true)?,
                None => {
                    warn!(field = %fieldname, "Attempt to set FieldRef whose object has gone");
                    return Ok(false);
                }
            },
            Binding::RecordBlob { .. } => {
                let changed = self.with_record_blob(|blob| blob.set_blob(value, true))?;
                if changed {
                    self.set_fk_to_blob()?;
                }
                changed
            }
            Binding::IsolatedBlob(blob) => blob.lock().set_blob(value, false)?,
            Binding::Closures { setter, .. } => setter(value),
            Binding::StoredVar { store, name, cached } => {
                if *cached {
                    store.set_cached_var(name, value)?
                } else {
                    store.set_var(name, value)?
                }
            }
        };
        self.signal_set_value(changed, originator);
        Ok(changed)
    }

    fn with_record_blob<T>(&self, f: impl FnOnce(&mut Blob) -> DatabaseResult<T>) -> DatabaseResult<T> {
        match &self.binding {
            Binding::RecordBlob { blob, .. } | Binding::IsolatedBlob(blob) => f(&mut blob.lock()),
            _ => Err(DatabaseError::InvalidQuery(format!(
                "{} is not a BLOB reference",
                self.binding.method_description()
            ))),
        }
    }

    /// Point the owning field at the BLOB's PK, touching the record.
    fn set_fk_to_blob(&self) -> DatabaseResult<()> {
        if let Binding::RecordBlob { object, fieldname, blob } = &self.binding {
            let blob_pk = blob.lock().pk_value();
            if let Some(object) = object.upgrade() {
                object.lock().set_value(fieldname, Value::Int64(blob_pk), true)?;
            }
        }
        Ok(())
    }

    fn signal_set_value(&self, changed: bool, originator: Option<Originator>) {
        if changed {
            self.emit(FieldRefSignal::ValueChanged, originator);
        }
        let autosave_target = match &self.binding {
            Binding::Record { object, autosave: true, .. } | Binding::RecordBlob { object, .. } => {
                object.upgrade()
            }
            _ => None,
        };
        if let Some(object) = autosave_target {
            object.lock().save();
        }
    }

    /// Re-broadcast the current value to subscribers.
    pub fn emit_value_changed(&self, originator: Option<Originator>) {
        self.emit(FieldRefSignal::ValueChanged, originator);
    }

    pub fn is_null(&self) -> bool {
        self.value().is_null()
    }

    pub fn value_bool(&self) -> bool {
        self.value().to_bool()
    }

    pub fn value_int(&self) -> i32 {
        self.value()
            .to_i64()
            .and_then(|i| i32::try_from(i).ok())
            .unwrap_or(0)
    }

    pub fn value_i64(&self) -> i64 {
        self.value().to_i64().unwrap_or(0)
    }

    pub fn value_double(&self) -> f64 {
        self.value().to_f64().unwrap_or(0.0)
    }

    pub fn value_string(&self) -> String {
        self.value().to_text()
    }

    pub fn value_string_list(&self) -> Vec<String> {
        self.value().to_string_list()
    }

    pub fn value_int_list(&self) -> Vec<i32> {
        self.value().to_int_list()
    }

    pub fn value_date(&self) -> Option<chrono::NaiveDate> {
        self.value().to_date()
    }

    pub fn value_datetime(&self) -> Option<chrono::DateTime<chrono::FixedOffset>> {
        self.value().to_datetime()
    }

    // ------------------------------------------------------------------------
    // BLOBs
    // ------------------------------------------------------------------------

    pub fn is_blob(&self) -> bool {
        matches!(self.binding, Binding::RecordBlob { .. } | Binding::IsolatedBlob(_))
    }

    pub fn image_bytes(&self) -> Vec<u8> {
        match self.value() {
            Value::Bytes(bytes) => bytes,
            other => other.to_text().into_bytes(),
        }
    }

    /// Store encoded image data. BLOB references also record the file
    /// extension and MIME type.
    pub fn set_raw_image(
        &self,
        data: Vec<u8>,
        extension_without_dot: &str,
        mimetype: &str,
        originator: Option<Originator>,
    ) -> DatabaseResult<bool> {
        if !self.is_blob() {
            return self.set_value(data, originator);
        }
        let save = matches!(self.binding, Binding::RecordBlob { .. });
        let changed = self.with_record_blob(|blob| {
            blob.set_raw_image(data, extension_without_dot, mimetype, save)
        })?;
        if changed {
            self.set_fk_to_blob()?;
        }
        self.signal_set_value(changed, originator);
        Ok(changed)
    }

    /// Display rotation of a BLOB image; 0 for anything else.
    pub fn rotation(&self) -> i32 {
        self.with_record_blob(|blob| Ok(blob.rotation())).unwrap_or(0)
    }

    /// Rotate a BLOB image by changing its stored rotation.
    pub fn rotate_image(&self, angle_degrees_clockwise: i32, originator: Option<Originator>) -> DatabaseResult<()> {
        if angle_degrees_clockwise.rem_euclid(360) == 0 {
            return Ok(());
        }
        let save = matches!(self.binding, Binding::RecordBlob { .. });
        self.with_record_blob(|blob| {
            let rotation = (blob.rotation() + angle_degrees_clockwise.rem_euclid(360)).rem_euclid(360);
            blob.set_rotation(rotation, save)
        })?;
        self.set_fk_to_blob()?;
        self.signal_set_value(true, originator);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Completeness
    // ------------------------------------------------------------------------

    pub fn mandatory(&self) -> bool {
        self.state.lock().mandatory
    }

    /// Non-NULL and not an empty string.
    pub fn complete(&self) -> bool {
        let value = self.value();
        !value.is_null() && !value.to_text().is_empty()
    }

    pub fn missing_input(&self) -> bool {
        self.mandatory() && !self.complete()
    }

    pub fn set_mandatory(&self, mandatory: bool, originator: Option<Originator>) {
        {
            let mut state = self.state.lock();
            if state.mandatory == mandatory {
                return;
            }
            state.mandatory = mandatory;
        }
        self.emit(FieldRefSignal::MandatoryChanged, originator);
    }

    pub fn hint(&self) -> Value {
        self.state.lock().hint.clone()
    }

    pub fn set_hint(&self, hint: impl Into<Value>) {
        self.state.lock().hint = hint.into();
    }

    // ------------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------------

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&FieldRef, &FieldRefEvent) + Send + Sync + 'static,
    {
        self.add_subscriber(None, Arc::new(callback))
    }

    /// Subscribe on behalf of `originator`; events it caused are skipped.
    pub fn subscribe_as<F>(&self, originator: Originator, callback: F) -> SubscriptionId
    where
        F: Fn(&FieldRef, &FieldRefEvent) + Send + Sync + 'static,
    {
        self.add_subscriber(Some(originator), Arc::new(callback))
    }

    fn add_subscriber(&self, originator: Option<Originator>, callback: FieldRefCallback) -> SubscriptionId {
        let mut state = self.state.lock();
        let id = SubscriptionId(state.next_subscription);
        state.next_subscription += 1;
        state.subscribers.push(Subscriber {
            id,
            originator,
            callback,
        });
        id
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|s| s.id != id);
        state.subscribers.len() != before
    }

    fn emit(&self, signal: FieldRefSignal, originator: Option<Originator>) {
        let event = FieldRefEvent { signal, originator };
        let callbacks: Vec<FieldRefCallback> = {
            let state = self.state.lock();
            state
                .subscribers
                .iter()
                .filter(|s| s.originator.is_none() || s.originator != originator)
                .map(|s| Arc::clone(&s.callback))
                .collect()
        };
        debug!(method = self.method_description(), ?signal, n = callbacks.len(), "FieldRef emitting");
        for callback in callbacks {
            callback(self, &event);
        }
    }

    // ------------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------------

    pub fn method_description(&self) -> &'static str {
        self.binding.method_description()
    }

    pub fn target_description(&self) -> String {
        match &self.binding {
            Binding::Field(field) => field.lock().name().to_string(),
            Binding::Record { object, fieldname, .. } => match object.upgrade() {
                Some(object) => format!("{}.{fieldname}", object.lock().tablename()),
                None => "<object gone>".to_string(),
            },
            Binding::RecordBlob { object, fieldname, blob } => match object.upgrade() {
                Some(object) => format!(
                    "{}.{fieldname}, {}",
                    object.lock().tablename(),
                    blob.lock()
                ),
                None => "<object gone>".to_string(),
            },
            Binding::IsolatedBlob(blob) => blob.lock().to_string(),
            Binding::Closures { .. } => "get/set functions".to_string(),
            Binding::StoredVar { name, .. } => name.clone(),
        }
    }
}

impl fmt::Debug for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRef")
            .field("method", &self.method_description())
            .field("mandatory", &self.mandatory())
            .field("hint", &self.hint())
            .finish()
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FieldRef(method={}, mandatory={}, target={}, hint={})",
            self.method_description(),
            self.mandatory(),
            self.target_description(),
            self.hint()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;
    use std::sync::atomic::AtomicUsize;

    fn shared_field() -> Arc<Mutex<Field>> {
        Arc::new(Mutex::new(Field::new("f", FieldType::String)))
    }

    fn counter(fieldref: &FieldRef) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        fieldref.subscribe(move |_, event| {
            if event.signal == FieldRefSignal::ValueChanged {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });
        count
    }

    #[test]
    fn test_field_binding_notifies_on_change_only() {
        let fieldref = FieldRef::for_field(shared_field(), false);
        let count = counter(&fieldref);
        assert!(fieldref.set_value("a", None).unwrap());
        assert!(!fieldref.set_value("a", None).unwrap());
        assert!(fieldref.set_value("b", None).unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(fieldref.value_string(), "b");
    }

    #[test]
    fn test_originator_is_not_echoed() {
        let fieldref = FieldRef::for_field(shared_field(), false);
        let me = Originator::new();
        let mine = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&mine);
        fieldref.subscribe_as(me, move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let others = counter(&fieldref);

        fieldref.set_value("x", Some(me)).unwrap();
        assert_eq!(mine.load(Ordering::SeqCst), 0);
        assert_eq!(others.load(Ordering::SeqCst), 1);

        fieldref.set_value("y", Some(Originator::new())).unwrap();
        assert_eq!(mine.load(Ordering::SeqCst), 1);
        assert_eq!(others.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let fieldref = FieldRef::for_field(shared_field(), false);
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let id = fieldref.subscribe(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        fieldref.set_value("a", None).unwrap();
        assert!(fieldref.unsubscribe(id));
        assert!(!fieldref.unsubscribe(id));
        fieldref.set_value("b", None).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_input_and_mandatory_signal() {
        let fieldref = FieldRef::for_field(shared_field(), true);
        assert!(fieldref.missing_input());
        fieldref.set_value("", None).unwrap();
        assert!(fieldref.missing_input());
        fieldref.set_value("done", None).unwrap();
        assert!(!fieldref.missing_input());

        let changes = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&changes);
        fieldref.subscribe(move |fr, event| {
            if event.signal == FieldRefSignal::MandatoryChanged {
                assert!(!fr.mandatory());
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });
        fieldref.set_mandatory(false, None);
        fieldref.set_mandatory(false, None);
        assert_eq!(changes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closures_binding() {
        let store = Arc::new(Mutex::new(Value::from(1)));
        let get_store = Arc::clone(&store);
        let set_store = Arc::clone(&store);
        let fieldref = FieldRef::for_closures(
            Box::new(move || get_store.lock().clone()),
            Box::new(move |v| {
                let mut current = set_store.lock();
                let changed = *current != v;
                *current = v;
                changed
            }),
            false,
        );
        assert_eq!(fieldref.value_int(), 1);
        assert!(fieldref.set_value(2, None).unwrap());
        assert_eq!(*store.lock(), Value::Int(2));
        assert_eq!(fieldref.method_description(), "Functions");
    }

    #[test]
    fn test_callback_can_read_value() {
        let fieldref = FieldRef::for_field(shared_field(), false);
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&seen);
        fieldref.subscribe(move |fr, _| {
            *sink.lock() = fr.value_string();
        });
        fieldref.set_value("hello", None).unwrap();
        assert_eq!(*seen.lock(), "hello");
    }

    #[test]
    fn test_hint_and_display() {
        let fieldref = FieldRef::for_field(shared_field(), false);
        fieldref.set_hint("page 2");
        assert_eq!(fieldref.hint(), Value::from("page 2"));
        assert_eq!(
            fieldref.to_string(),
            "FieldRef(method=Field, mandatory=false, target=f, hint=page 2)"
        );
        assert!(!fieldref.is_blob());
        assert_eq!(fieldref.rotation(), 0);
    }
}
