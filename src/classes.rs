use crate::ast::{BlockLit, MethodDef};
use crate::error::{RunResult, RuntimeError};
use crate::intern;
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::rc::Rc;
use tracing::debug;

pub const BUILTIN_CLASSES: [&str; 7] =
    ["Object", "Nil", "True", "False", "Integer", "String", "Block"];

/// A class descriptor: name, parent link and the selector table. Descriptors
/// are built once while the program loads and never change afterwards.
pub struct ClassInfo
{
    pub name: Rc<str>,
    pub parent: Option<Rc<ClassInfo>>,
    methods: FxHashMap<Rc<str>, Rc<BlockLit>>,
}

impl ClassInfo
{
    fn new(name: Rc<str>, parent: Option<Rc<ClassInfo>>) -> Self
    {
        Self {
            name,
            parent,
            methods: FxHashMap::default(),
        }
    }

    /// Look up a selector on this class, then up the parent chain.
    pub fn find_method(&self, selector: &str) -> Option<Rc<BlockLit>>
    {
        if let Some(body) = self.methods.get(selector)
        {
            return Some(body.clone());
        }
        self.parent.as_ref().and_then(|p| p.find_method(selector))
    }

    /// Look up a selector on the ancestors only, skipping this class.
    pub fn find_method_in_parent(&self, selector: &str) -> Option<Rc<BlockLit>>
    {
        self.parent.as_ref().and_then(|p| p.find_method(selector))
    }

    /// True when this class is `name` or descends from it.
    pub fn is_or_inherits(&self, name: &str) -> bool
    {
        if *self.name == *name
        {
            return true;
        }
        self.parent.as_ref().is_some_and(|p| p.is_or_inherits(name))
    }
}

/// `from:` compatibility: the two classes must be the same, or one must be
/// an ancestor of the other.
pub fn classes_related(a: &Rc<ClassInfo>, b: &Rc<ClassInfo>) -> bool
{
    chain_contains(a, b) || chain_contains(b, a)
}

fn chain_contains(start: &Rc<ClassInfo>, target: &Rc<ClassInfo>) -> bool
{
    let mut cursor = Some(start.clone());
    while let Some(class) = cursor
    {
        if Rc::ptr_eq(&class, target)
        {
            return true;
        }
        cursor = class.parent.clone();
    }
    false
}

pub struct ClassRegistry
{
    classes: FxHashMap<Rc<str>, Rc<ClassInfo>>,
    nil_class: Rc<ClassInfo>,
    true_class: Rc<ClassInfo>,
    false_class: Rc<ClassInfo>,
    integer_class: Rc<ClassInfo>,
    string_class: Rc<ClassInfo>,
    block_class: Rc<ClassInfo>,
}

impl ClassRegistry
{
    /// A registry with the seven built-ins pre-registered, `Object` as the
    /// root and every other built-in attached directly under it.
    pub fn with_builtins() -> Self
    {
        let object_class = Rc::new(ClassInfo::new(intern::name("Object"), None));
        let child =
            |name: &str| Rc::new(ClassInfo::new(intern::name(name), Some(object_class.clone())));

        let nil_class = child("Nil");
        let true_class = child("True");
        let false_class = child("False");
        let integer_class = child("Integer");
        let string_class = child("String");
        let block_class = child("Block");

        let mut classes = FxHashMap::default();
        for class in [
            &object_class,
            &nil_class,
            &true_class,
            &false_class,
            &integer_class,
            &string_class,
            &block_class,
        ]
        {
            classes.insert(class.name.clone(), class.clone());
        }

        Self {
            classes,
            nil_class,
            true_class,
            false_class,
            integer_class,
            string_class,
            block_class,
        }
    }

    pub fn get(&self, name: &str) -> Option<Rc<ClassInfo>>
    {
        self.classes.get(name).cloned()
    }

    pub fn exists(&self, name: &str) -> bool
    {
        self.classes.contains_key(name)
    }

    pub fn add_class(
        &mut self,
        name: Rc<str>,
        parent_name: &str,
        methods: &[MethodDef],
    ) -> RunResult<()>
    {
        if !is_class_name(&name)
        {
            return Err(RuntimeError::type_error(format!(
                "'{name}' is not a valid class name"
            )));
        }
        if self.exists(&name)
        {
            return Err(RuntimeError::type_error(format!(
                "class '{name}' is already defined"
            )));
        }
        let parent = self
            .get(parent_name)
            .ok_or_else(|| RuntimeError::undefined(parent_name))?;

        let mut class = ClassInfo::new(name.clone(), Some(parent));
        for method in methods
        {
            if class.methods.contains_key(&method.selector)
            {
                return Err(RuntimeError::type_error(format!(
                    "class '{name}' defines '{}' twice",
                    method.selector
                )));
            }
            class.methods.insert(method.selector.clone(), method.body.clone());
        }
        debug!(class = %name, parent = %parent_name, methods = methods.len(), "class registered");
        self.classes.insert(name, Rc::new(class));
        Ok(())
    }

    /// The class a value dispatches through: objects carry their own class,
    /// every primitive maps onto its built-in descriptor.
    pub fn class_of(&self, value: &Value) -> Rc<ClassInfo>
    {
        match value
        {
            Value::Nil => self.nil_class.clone(),
            Value::True => self.true_class.clone(),
            Value::False => self.false_class.clone(),
            Value::Integer(_) => self.integer_class.clone(),
            Value::Str(_) => self.string_class.clone(),
            Value::Block(_) => self.block_class.clone(),
            Value::Object(obj) => obj.class.clone(),
        }
    }

    /// The entry-point requirement: a `Main` class answering `run`.
    pub fn require_main(&self) -> RunResult<Rc<ClassInfo>>
    {
        let main = self
            .get("Main")
            .ok_or_else(|| RuntimeError::MissingMain("class 'Main' is not defined".into()))?;
        if main.find_method("run").is_none()
        {
            return Err(RuntimeError::MissingMain(
                "class 'Main' has no 'run' method".into(),
            ));
        }
        Ok(main)
    }
}

pub fn is_class_name(name: &str) -> bool
{
    let mut chars = name.chars();
    match chars.next()
    {
        Some(c) if c.is_ascii_uppercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::ast::BlockLit;

    fn empty_block() -> Rc<BlockLit>
    {
        Rc::new(BlockLit {
            params: Vec::new(),
            body: Vec::new(),
        })
    }

    fn method(selector: &str) -> MethodDef
    {
        MethodDef {
            selector: intern::name(selector),
            body: empty_block(),
        }
    }

    #[test]
    fn builtins_are_preregistered()
    {
        let registry = ClassRegistry::with_builtins();
        for name in BUILTIN_CLASSES
        {
            assert!(registry.exists(name), "missing builtin {name}");
        }
        let integer = registry.get("Integer").unwrap();
        assert_eq!(&*integer.parent.as_ref().unwrap().name, "Object");
    }

    #[test]
    fn add_class_rejects_builtin_collision()
    {
        let mut registry = ClassRegistry::with_builtins();
        let err = registry
            .add_class(intern::name("Integer"), "Object", &[])
            .unwrap_err();
        assert_eq!(err.code(), 52);
    }

    #[test]
    fn add_class_rejects_unknown_parent()
    {
        let mut registry = ClassRegistry::with_builtins();
        let err = registry
            .add_class(intern::name("Orphan"), "Nowhere", &[])
            .unwrap_err();
        assert_eq!(err.code(), 32);
    }

    #[test]
    fn add_class_rejects_bad_name()
    {
        let mut registry = ClassRegistry::with_builtins();
        for bad in ["lower", "Has_Underscore", ""]
        {
            let err = registry.add_class(intern::name(bad), "Object", &[]).unwrap_err();
            assert_eq!(err.code(), 52, "{bad:?} should be rejected");
        }
    }

    #[test]
    fn add_class_rejects_duplicate_selector()
    {
        let mut registry = ClassRegistry::with_builtins();
        let err = registry
            .add_class(intern::name("A"), "Object", &[method("m"), method("m")])
            .unwrap_err();
        assert_eq!(err.code(), 52);
    }

    #[test]
    fn method_lookup_walks_the_chain()
    {
        let mut registry = ClassRegistry::with_builtins();
        registry
            .add_class(intern::name("A"), "Object", &[method("m"), method("n")])
            .unwrap();
        registry
            .add_class(intern::name("B"), "A", &[method("m")])
            .unwrap();

        let b = registry.get("B").unwrap();
        assert!(b.find_method("m").is_some());
        assert!(b.find_method("n").is_some());
        assert!(b.find_method("absent").is_none());

        // The parent-only lookup must skip B's own override.
        let a = registry.get("A").unwrap();
        let own = b.find_method("m").unwrap();
        let inherited = b.find_method_in_parent("m").unwrap();
        assert!(Rc::ptr_eq(&inherited, &a.find_method("m").unwrap()));
        assert!(!Rc::ptr_eq(&own, &inherited));
    }

    #[test]
    fn ancestry_and_compatibility()
    {
        let mut registry = ClassRegistry::with_builtins();
        registry
            .add_class(intern::name("MyInt"), "Integer", &[])
            .unwrap();
        registry.add_class(intern::name("Other"), "Object", &[]).unwrap();

        let my_int = registry.get("MyInt").unwrap();
        let integer = registry.get("Integer").unwrap();
        let other = registry.get("Other").unwrap();

        assert!(my_int.is_or_inherits("Integer"));
        assert!(!other.is_or_inherits("Integer"));
        assert!(classes_related(&my_int, &integer));
        assert!(classes_related(&integer, &my_int));
        assert!(!classes_related(&my_int, &other));
    }
}
