//! The host-side value model.
//!
//! Everything that crosses the embind ABI is represented on the host as a
//! [`Value`]: a sealed variant over the registrable kinds (primitives,
//! strings, tuples, struct-like objects, enums, memory views, C++ instance
//! handles) plus two escape hatches for emval traffic — host functions and
//! opaque host objects implementing [`crate::Reflect`].
//!
//! Arrays and objects use shared interior mutability so that an emval handle
//! and the host observe the same underlying storage: setting a property
//! through a handle is visible to every clone of the value, the way it is for
//! the dynamic objects this ABI was designed around.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::{EmbindError, EmbindResult, Reflect};

/// Stable id of a registered pointer converter inside one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PtrId(pub usize);

/// Stable id of a registered class inside one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub usize);

/// Element kind of a guest memory view, in ABI index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
    I64,
    U64,
}

impl ViewKind {
    /// Map the ABI `dataTypeIndex` to an element kind.
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(Self::I8),
            1 => Some(Self::U8),
            2 => Some(Self::I16),
            3 => Some(Self::U16),
            4 => Some(Self::I32),
            5 => Some(Self::U32),
            6 => Some(Self::F32),
            7 => Some(Self::F64),
            8 => Some(Self::I64),
            9 => Some(Self::U64),
            _ => None,
        }
    }

    /// Native size of one element in bytes.
    pub fn element_size(self) -> u32 {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 | Self::I64 | Self::U64 => 8,
        }
    }
}

/// A typed window into guest linear memory. The data is *not* copied; reads
/// go back through the guest, so the view stays coherent with guest writes
/// and never outlives its engine's module instance meaningfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryView {
    /// Element kind.
    pub kind: ViewKind,
    /// Guest address of the first element.
    pub ptr: u32,
    /// Element count.
    pub len: u32,
}

/// One member of a registered enum, carrying both the C++ wire value and the
/// names under which the host knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    /// Name of the enum type, e.g. `Color`.
    pub enum_name: Rc<str>,
    /// Member name, e.g. `GREEN`.
    pub name: Rc<str>,
    /// The C++ wire representation.
    pub value: i64,
}

/// Shared storage behind [`Value::Array`].
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;

/// Shared storage behind [`Value::Object`].
pub type ObjectRef = Rc<RefCell<BTreeMap<String, Value>>>;

/// A host function callable from the guest through emval dispatch.
#[derive(Clone)]
pub struct HostFunction {
    name: Rc<str>,
    func: Rc<dyn Fn(&[Value]) -> EmbindResult<Value>>,
}

impl HostFunction {
    /// Wrap a host closure under the given name (used in error messages).
    pub fn new(name: impl Into<Rc<str>>, func: impl Fn(&[Value]) -> EmbindResult<Value> + 'static) -> Self {
        Self {
            name: name.into(),
            func: Rc::new(func),
        }
    }

    /// The function's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the function.
    pub fn call(&self, args: &[Value]) -> EmbindResult<Value> {
        (*self.func)(args)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFunction({})", self.name)
    }
}

/// The record behind every handle to one C++ instance.
///
/// All clones of a handle point at the same record; the refcount cell is
/// therefore shared and the raw pointer is stable across clones. `delete()`
/// on the last reference neuters the record by zeroing `ptr`.
#[derive(Debug)]
pub struct InstanceRecord {
    /// The pointer converter this handle was decoded through.
    pub ptr_type: PtrId,
    /// Raw pointer to the C++ object; `0` once deleted.
    pub ptr: u32,
    /// Smart-pointer converter, present iff `smart_ptr` is.
    pub smart_type: Option<PtrId>,
    /// Raw smart pointer owned by this record, present iff `smart_type` is.
    pub smart_ptr: Option<u32>,
    /// Shared reference count; `0` means the record is neutered.
    pub count: Rc<Cell<i32>>,
}

/// A refcounted handle to one C++ instance.
#[derive(Debug, Clone)]
pub struct ClassHandle {
    record: Rc<RefCell<InstanceRecord>>,
}

impl ClassHandle {
    /// Build a handle with refcount 1. The smart fields must be both present
    /// or both absent.
    pub fn new(ptr_type: PtrId, ptr: u32, smart: Option<(PtrId, u32)>) -> EmbindResult<Self> {
        if ptr == 0 {
            return Err(EmbindError::internal("class handle requires a non-null pointer"));
        }
        let (smart_type, smart_ptr) = match smart {
            Some((ty, p)) => (Some(ty), Some(p)),
            None => (None, None),
        };
        Ok(Self {
            record: Rc::new(RefCell::new(InstanceRecord {
                ptr_type,
                ptr,
                smart_type,
                smart_ptr,
                count: Rc::new(Cell::new(1)),
            })),
        })
    }

    /// Shared access to the underlying record.
    pub fn record(&self) -> &Rc<RefCell<InstanceRecord>> {
        &self.record
    }

    /// The pointer converter the handle was decoded through.
    pub fn ptr_type(&self) -> PtrId {
        self.record.borrow().ptr_type
    }

    /// The raw pointer, or `0` if the handle has been deleted.
    pub fn ptr(&self) -> u32 {
        self.record.borrow().ptr
    }

    /// The smart-pointer pair, if this handle owns one.
    pub fn smart(&self) -> Option<(PtrId, u32)> {
        let record = self.record.borrow();
        record.smart_type.zip(record.smart_ptr)
    }

    /// Current reference count.
    pub fn count(&self) -> i32 {
        self.record.borrow().count.get()
    }

    /// True once `delete()` has run on the record.
    pub fn is_deleted(&self) -> bool {
        self.record.borrow().ptr == 0
    }

    /// Another handle to the same record, with the count bumped.
    pub fn acquire(&self) -> Self {
        let record = self.record.borrow();
        record.count.set(record.count.get() + 1);
        drop(record);
        Self {
            record: Rc::clone(&self.record),
        }
    }

    /// True when both handles refer to the same record.
    pub fn same_record(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.record, &other.record)
    }
}

/// Opaque host object dispatched through the [`Reflect`] capability.
#[derive(Clone)]
pub struct ForeignRef(pub Rc<dyn Reflect>);

impl fmt::Debug for ForeignRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Foreign({})", self.0.type_name())
    }
}

/// A host-side value crossing the embind ABI.
#[derive(Debug, Clone)]
pub enum Value {
    /// The `undefined` sentinel.
    Undefined,
    /// The `null` sentinel (also a null class pointer).
    Null,
    /// Booleans.
    Bool(bool),
    /// `char` / `signed char`.
    I8(i8),
    /// `unsigned char`.
    U8(u8),
    /// `short`.
    I16(i16),
    /// `unsigned short`.
    U16(u16),
    /// `int` / `long`.
    I32(i32),
    /// `unsigned int` / `unsigned long`.
    U32(u32),
    /// `int64_t`.
    I64(i64),
    /// `uint64_t`.
    U64(u64),
    /// `float`.
    F32(f32),
    /// `double`.
    F64(f64),
    /// Text: `std::string` (UTF-8) and wide strings.
    Str(String),
    /// A non-UTF-8 `std::basic_string<char>` payload.
    Bytes(Vec<u8>),
    /// A tuple / array with shared identity.
    Array(ArrayRef),
    /// A struct-like object with shared identity.
    Object(ObjectRef),
    /// A registered enum member.
    Enum(EnumValue),
    /// A typed view into guest memory.
    View(MemoryView),
    /// A handle to a C++ instance.
    Instance(ClassHandle),
    /// A host function reachable from the guest.
    Function(HostFunction),
    /// An opaque host object with [`Reflect`] dispatch.
    Foreign(ForeignRef),
}

impl Value {
    /// An empty shared object.
    pub fn empty_object() -> Self {
        Self::Object(Rc::new(RefCell::new(BTreeMap::new())))
    }

    /// A shared object from key/value pairs.
    pub fn object<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::Object(Rc::new(RefCell::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    /// A shared array from elements.
    pub fn array(elements: Vec<Value>) -> Self {
        Self::Array(Rc::new(RefCell::new(elements)))
    }

    /// A host function value.
    pub fn function(
        name: impl Into<Rc<str>>,
        func: impl Fn(&[Value]) -> EmbindResult<Value> + 'static,
    ) -> Self {
        Self::Function(HostFunction::new(name, func))
    }

    /// A foreign value with [`Reflect`] dispatch.
    pub fn foreign(value: Rc<dyn Reflect>) -> Self {
        Self::Foreign(ForeignRef(value))
    }

    /// Short kind name for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::I8(_) => "i8",
            Self::U8(_) => "u8",
            Self::I16(_) => "i16",
            Self::U16(_) => "u16",
            Self::I32(_) => "i32",
            Self::U32(_) => "u32",
            Self::I64(_) => "i64",
            Self::U64(_) => "u64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Str(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Enum(_) => "enum",
            Self::View(_) => "memory view",
            Self::Instance(_) => "instance",
            Self::Function(_) => "function",
            Self::Foreign(_) => "foreign value",
        }
    }

    /// The boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The `i32` payload, if any.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::I32(v) => Some(*v),
            _ => None,
        }
    }

    /// Any numeric payload widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::I8(v) => Some(f64::from(*v)),
            Self::U8(v) => Some(f64::from(*v)),
            Self::I16(v) => Some(f64::from(*v)),
            Self::U16(v) => Some(f64::from(*v)),
            Self::I32(v) => Some(f64::from(*v)),
            Self::U32(v) => Some(f64::from(*v)),
            Self::I64(v) => Some(*v as f64),
            Self::U64(v) => Some(*v as f64),
            Self::F32(v) => Some(f64::from(*v)),
            Self::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// The string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The shared array storage, if any.
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The shared object storage, if any.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// The enum payload, if any.
    pub fn as_enum(&self) -> Option<&EnumValue> {
        match self {
            Self::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// The class-handle payload, if any.
    pub fn as_instance(&self) -> Option<&ClassHandle> {
        match self {
            Self::Instance(h) => Some(h),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::I8(a), Self::I8(b)) => a == b,
            (Self::U8(a), Self::U8(b)) => a == b,
            (Self::I16(a), Self::I16(b)) => a == b,
            (Self::U16(a), Self::U16(b)) => a == b,
            (Self::I32(a), Self::I32(b)) => a == b,
            (Self::U32(a), Self::U32(b)) => a == b,
            (Self::I64(a), Self::I64(b)) => a == b,
            (Self::U64(a), Self::U64(b)) => a == b,
            (Self::F32(a), Self::F32(b)) => a == b,
            (Self::F64(a), Self::F64(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Self::Enum(a), Self::Enum(b)) => a == b,
            (Self::View(a), Self::View(b)) => a == b,
            (Self::Instance(a), Self::Instance(b)) => a.same_record(b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(&a.func, &b.func),
            (Self::Foreign(a), Self::Foreign(b)) => Rc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Self::I8(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Self::U8(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::I16(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Self::U16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::U32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::U64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::array(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Self::Object(Rc::new(RefCell::new(v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrays_share_storage_across_clones() {
        let a = Value::array(vec![Value::I32(1)]);
        let b = a.clone();
        if let Value::Array(storage) = &a {
            storage.borrow_mut().push(Value::I32(2));
        }
        assert_eq!(b.as_array().unwrap().borrow().len(), 2);
    }

    #[test]
    fn class_handle_clones_share_the_refcount_cell() {
        let h = ClassHandle::new(PtrId(0), 0x100, None).unwrap();
        let h2 = h.acquire();
        assert_eq!(h.count(), 2);
        assert_eq!(h2.count(), 2);
        assert!(h.same_record(&h2));
        assert_eq!(h2.ptr(), 0x100);
    }

    #[test]
    fn class_handle_rejects_null_pointers() {
        assert!(ClassHandle::new(PtrId(0), 0, None).is_err());
    }

    #[test]
    fn view_kind_table_matches_the_abi_order() {
        assert_eq!(ViewKind::from_index(0), Some(ViewKind::I8));
        assert_eq!(ViewKind::from_index(7), Some(ViewKind::F64));
        assert_eq!(ViewKind::from_index(9), Some(ViewKind::U64));
        assert_eq!(ViewKind::from_index(10), None);
        assert_eq!(ViewKind::U16.element_size(), 2);
        assert_eq!(ViewKind::I64.element_size(), 8);
    }

    #[test]
    fn value_equality_is_structural_for_data_kinds() {
        assert_eq!(Value::from(3i32), Value::I32(3));
        assert_ne!(Value::from(3i32), Value::U32(3));
        assert_eq!(
            Value::array(vec![Value::from("a")]),
            Value::array(vec![Value::from("a")])
        );
        let f = Value::function("f", |_| Ok(Value::Undefined));
        let g = Value::function("f", |_| Ok(Value::Undefined));
        assert_ne!(f, g);
        assert_eq!(f, f.clone());
    }
}
