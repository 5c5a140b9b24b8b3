use crate::ast::BlockLit;
use crate::classes::ClassInfo;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::thread_local;

pub type AttrMap = FxHashMap<Rc<str>, Value>;

// The attribute maps of the three constants outlive any single value handle:
// every occurrence of `nil`, `true` or `false` in a program is the same
// object, so their attributes are process-wide.
thread_local! {
    static NIL_ATTRS: RefCell<AttrMap> = RefCell::new(AttrMap::default());
    static TRUE_ATTRS: RefCell<AttrMap> = RefCell::new(AttrMap::default());
    static FALSE_ATTRS: RefCell<AttrMap> = RefCell::new(AttrMap::default());
}

// A fresh interpreter is a fresh run; whatever an earlier run attached to
// the constants must not leak into it.
pub fn reset_singleton_attrs()
{
    NIL_ATTRS.with(|map| map.borrow_mut().clear());
    TRUE_ATTRS.with(|map| map.borrow_mut().clear());
    FALSE_ATTRS.with(|map| map.borrow_mut().clear());
}

/// A runtime block: the shared literal plus the `self` that was visible when
/// the literal was evaluated.
pub struct BlockValue
{
    pub lit: Rc<BlockLit>,
    pub captured_self: Option<Value>,
    pub attrs: RefCell<AttrMap>,
}

impl BlockValue
{
    pub fn new(lit: Rc<BlockLit>, captured_self: Option<Value>) -> Rc<Self>
    {
        Rc::new(Self {
            lit,
            captured_self,
            attrs: RefCell::new(AttrMap::default()),
        })
    }
}

/// A user-class instance. `internal` carries the primitive a subclass of
/// Integer, String or Block behaves as; messages it cannot answer itself are
/// forwarded there.
pub struct ObjectData
{
    pub class: Rc<ClassInfo>,
    pub attrs: RefCell<AttrMap>,
    pub internal: RefCell<Option<Value>>,
}

impl ObjectData
{
    pub fn new(class: Rc<ClassInfo>, internal: Option<Value>) -> Rc<Self>
    {
        Rc::new(Self {
            class,
            attrs: RefCell::new(AttrMap::default()),
            internal: RefCell::new(internal),
        })
    }
}

#[derive(Clone)]
pub enum Value
{
    Nil,
    True,
    False,
    Integer(i64),
    Str(Rc<str>),
    Block(Rc<BlockValue>),
    Object(Rc<ObjectData>),
}

impl Value
{
    pub fn boolean(truth: bool) -> Value
    {
        if truth { Value::True } else { Value::False }
    }

    pub fn is_true(&self) -> bool
    {
        matches!(self, Value::True)
    }

    // Built-in class name of the variant; objects answer with their own
    // class name.
    pub fn kind_name(&self) -> &str
    {
        match self
        {
            Value::Nil => "Nil",
            Value::True => "True",
            Value::False => "False",
            Value::Integer(_) => "Integer",
            Value::Str(_) => "String",
            Value::Block(_) => "Block",
            Value::Object(obj) => &obj.class.name,
        }
    }

    // Identity: the constants are process singletons, Integer and String
    // compare by their payload, Block and Object by allocation.
    pub fn is_identical(&self, other: &Value) -> bool
    {
        match (self, other)
        {
            (Value::Nil, Value::Nil) => true,
            (Value::True, Value::True) => true,
            (Value::False, Value::False) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Block(a), Value::Block(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn attr_get(&self, name: &str) -> Option<Value>
    {
        match self
        {
            Value::Nil => NIL_ATTRS.with(|map| map.borrow().get(name).cloned()),
            Value::True => TRUE_ATTRS.with(|map| map.borrow().get(name).cloned()),
            Value::False => FALSE_ATTRS.with(|map| map.borrow().get(name).cloned()),
            // Integer and String have value identity: a fresh copy never
            // carries attributes, so there is nothing reachable to read.
            Value::Integer(_) | Value::Str(_) => None,
            Value::Block(block) => block.attrs.borrow().get(name).cloned(),
            Value::Object(obj) => obj.attrs.borrow().get(name).cloned(),
        }
    }

    pub fn attr_set(&self, name: Rc<str>, value: Value)
    {
        match self
        {
            Value::Nil => NIL_ATTRS.with(|map| {
                map.borrow_mut().insert(name, value);
            }),
            Value::True => TRUE_ATTRS.with(|map| {
                map.borrow_mut().insert(name, value);
            }),
            Value::False => FALSE_ATTRS.with(|map| {
                map.borrow_mut().insert(name, value);
            }),
            // Accepted but unreachable afterwards: the receiver copy is the
            // only holder of the attribute and it is gone after the send.
            Value::Integer(_) | Value::Str(_) => {}
            Value::Block(block) =>
            {
                block.attrs.borrow_mut().insert(name, value);
            }
            Value::Object(obj) =>
            {
                obj.attrs.borrow_mut().insert(name, value);
            }
        }
    }

    pub fn attr_names(&self) -> Vec<Rc<str>>
    {
        match self
        {
            Value::Nil => NIL_ATTRS.with(|map| map.borrow().keys().cloned().collect()),
            Value::True => TRUE_ATTRS.with(|map| map.borrow().keys().cloned().collect()),
            Value::False => FALSE_ATTRS.with(|map| map.borrow().keys().cloned().collect()),
            Value::Integer(_) | Value::Str(_) => Vec::new(),
            Value::Block(block) => block.attrs.borrow().keys().cloned().collect(),
            Value::Object(obj) => obj.attrs.borrow().keys().cloned().collect(),
        }
    }
}

impl fmt::Debug for Value
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self
        {
            Value::Nil => write!(f, "Nil"),
            Value::True => write!(f, "True"),
            Value::False => write!(f, "False"),
            Value::Integer(n) => write!(f, "Integer({})", n),
            Value::Str(s) => write!(f, "String({:?})", s),
            Value::Block(block) => write!(f, "Block(arity {})", block.lit.arity()),
            Value::Object(obj) => write!(f, "Object({})", obj.class.name),
        }
    }
}

impl fmt::Display for Value
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self
        {
            Value::Nil => write!(f, "nil"),
            Value::True => write!(f, "true"),
            Value::False => write!(f, "false"),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::Block(block) => write!(f, "<block/{}>", block.lit.arity()),
            Value::Object(obj) => write!(f, "<{}>", obj.class.name),
        }
    }
}
