use crate::classes::{classes_related, ClassInfo};
use crate::error::{RunResult, RuntimeError};
use crate::eval::Interpreter;
use crate::intern;
use crate::methods;
use crate::value::Value;
use smallvec::SmallVec;
use std::rc::Rc;
use tracing::trace;

pub type Args = SmallVec<[Value; 4]>;

/// What receiver position evaluated to. Classes and `super` are not values;
/// keeping them out of `Value` means they cannot leak into argument position
/// or a variable.
pub enum Receiver
{
    Class(Rc<ClassInfo>),
    Super,
    Value(Value),
}

impl Receiver
{
    fn describe(&self) -> String
    {
        match self
        {
            Receiver::Class(class) => format!("class {}", class.name),
            Receiver::Super => "super".to_string(),
            Receiver::Value(value) => value.kind_name().to_string(),
        }
    }
}

impl Interpreter
{
    /// Entry point of every message send.
    #[tracing::instrument(level = "trace", skip(self, receiver, args), fields(selector = %selector))]
    pub(crate) fn send(
        &mut self,
        receiver: Receiver,
        selector: &Rc<str>,
        args: Args,
    ) -> RunResult<Value>
    {
        if intern::selector_arity(selector) != args.len()
        {
            return Err(RuntimeError::DoesNotUnderstand(format!(
                "{} does not understand '{selector}' with {} arguments",
                receiver.describe(),
                args.len()
            )));
        }
        match receiver
        {
            Receiver::Class(class) => self.class_message(class, selector, args),
            Receiver::Super => self.super_send(selector, args),
            Receiver::Value(value) => self.value_send(value, selector, args),
        }
    }

    /// Messages whose receiver is a class: instantiation, conversion and the
    /// single input primitive.
    fn class_message(&mut self, class: Rc<ClassInfo>, selector: &Rc<str>, args: Args)
        -> RunResult<Value>
    {
        match &**selector
        {
            "new" => match &*class.name
            {
                "Nil" => Ok(Value::Nil),
                "True" => Ok(Value::True),
                "False" => Ok(Value::False),
                "Integer" => Ok(Value::Integer(0)),
                "String" => Ok(Value::Str(intern::name(""))),
                "Block" => Err(RuntimeError::type_error(
                    "class Block cannot be instantiated",
                )),
                _ => Ok(self.allocate(&class)),
            },
            "from:" =>
            {
                let source = args.into_iter().next().unwrap_or(Value::Nil);
                self.instantiate_from(class, source)
            }
            "read" if &*class.name == "String" => Ok(Value::Str(self.read_line()?)),
            _ => Err(RuntimeError::dnu(&format!("class {}", class.name), selector)),
        }
    }

    fn instantiate_from(&mut self, class: Rc<ClassInfo>, source: Value) -> RunResult<Value>
    {
        let source_class = self.classes.class_of(&source);
        if !classes_related(&class, &source_class)
        {
            return Err(RuntimeError::value_error(format!(
                "cannot build a {} from a {}",
                class.name, source_class.name
            )));
        }
        match &*class.name
        {
            "Nil" => Ok(Value::Nil),
            "True" => Ok(Value::True),
            "False" => Ok(Value::False),
            "Integer" => match integer_payload(&source)
            {
                Some(n) => Ok(Value::Integer(n)),
                None => Err(RuntimeError::value_error("Integer from: expects an Integer")),
            },
            "String" => match string_payload(&source)
            {
                Some(text) => Ok(Value::Str(text)),
                None => Err(RuntimeError::value_error("String from: expects a String")),
            },
            "Block" => Err(RuntimeError::type_error("class Block cannot be instantiated")),
            _ =>
            {
                let instance = self.allocate(&class);
                match &source
                {
                    Value::Integer(_) | Value::Str(_) | Value::Block(_) =>
                    {
                        if let Value::Object(obj) = &instance
                        {
                            *obj.internal.borrow_mut() = Some(source);
                        }
                    }
                    Value::Object(_) =>
                    {
                        // Attributes travel through full setter dispatch so
                        // the collision rules apply to the copy as well.
                        for name in source.attr_names()
                        {
                            let value = match source.attr_get(&name)
                            {
                                Some(value) => value,
                                None => continue,
                            };
                            let setter = intern::name_owned(format!("{name}:"));
                            let mut setter_args = Args::new();
                            setter_args.push(value);
                            self.send(Receiver::Value(instance.clone()), &setter, setter_args)?;
                        }
                    }
                    Value::Nil | Value::True | Value::False => {}
                }
                Ok(instance)
            }
        }
    }

    /// `super` reroutes lookup past the receiver's own class; the receiver
    /// stays the enclosing `self`.
    fn super_send(&mut self, selector: &Rc<str>, args: Args) -> RunResult<Value>
    {
        let receiver = self
            .stack
            .current()
            .ok()
            .and_then(|frame| frame.receiver().cloned())
            .ok_or_else(|| {
                RuntimeError::type_error("'super' is only valid inside a method")
            })?;
        let class = self.classes.class_of(&receiver);
        let method = class
            .find_method_in_parent(selector)
            .ok_or_else(|| RuntimeError::dnu(&format!("super of {}", class.name), selector))?;
        self.exec_block(&method, args.into_vec(), Some(receiver))
    }

    /// The precedence ladder for value receivers. The first matching phase
    /// wins; later phases are never consulted.
    fn value_send(&mut self, receiver: Value, selector: &Rc<str>, args: Args) -> RunResult<Value>
    {
        // Block invocation.
        if let Value::Block(block) = &receiver
        {
            if methods::is_value_selector(selector, block.lit.arity())
            {
                trace!(arity = block.lit.arity(), "block invocation");
                let lit = block.lit.clone();
                let captured = block.captured_self.clone();
                return self.exec_block(&lit, args.into_vec(), captured);
            }
        }

        // Boolean control flow, short-circuiting.
        if matches!(receiver, Value::True | Value::False)
        {
            match &**selector
            {
                "ifTrue:ifFalse:" =>
                {
                    let chosen = if receiver.is_true() { args[0].clone() } else { args[1].clone() };
                    return self.invoke_value(chosen, "ifTrue:ifFalse:");
                }
                "and:" =>
                {
                    if !receiver.is_true()
                    {
                        return Ok(Value::False);
                    }
                    return self.invoke_value(args[0].clone(), "and:");
                }
                "or:" =>
                {
                    if receiver.is_true()
                    {
                        return Ok(Value::True);
                    }
                    return self.invoke_value(args[0].clone(), "or:");
                }
                _ => {}
            }
        }

        // Loops.
        if &**selector == "whileTrue:" && answers_value(&receiver)
        {
            loop
            {
                let condition = self.invoke_value(receiver.clone(), "whileTrue: condition")?;
                if !condition.is_true()
                {
                    break;
                }
                self.invoke_value(args[0].clone(), "whileTrue: body")?;
            }
            return Ok(Value::Nil);
        }
        if let (Value::Integer(count), "timesRepeat:") = (&receiver, &**selector)
        {
            for round in 1..=*count
            {
                self.invoke_value_with(args[0].clone(), Value::Integer(round), "timesRepeat:")?;
            }
            return Ok(Value::Nil);
        }

        // Direct printing. A user-defined `print` wins and is resolved by
        // the method-lookup phase below.
        if &**selector == "print"
        {
            match &receiver
            {
                Value::Str(text) =>
                {
                    let text = text.clone();
                    self.write_stdout(&text);
                    return Ok(receiver);
                }
                Value::Object(obj) if obj.class.find_method("print").is_none() =>
                {
                    let internal = obj.internal.borrow().clone();
                    if let Some(Value::Str(text)) = internal
                    {
                        self.write_stdout(&text);
                        return Ok(receiver);
                    }
                }
                _ => {}
            }
        }

        // User-defined methods on the receiver's class chain.
        let class = self.classes.class_of(&receiver);
        if let Some(method) = class.find_method(selector)
        {
            trace!(class = %class.name, "user method");
            return self.exec_block(&method, args.into_vec(), Some(receiver));
        }

        // Forward to the internal primitive, unwrapping wrapped arguments.
        if let Value::Object(obj) = &receiver
        {
            if methods::is_delegatable(selector)
            {
                let internal = obj.internal.borrow().clone();
                if let Some(inner) = internal
                {
                    trace!(class = %obj.class.name, "delegating to internal value");
                    let unwrapped: Args =
                        args.iter().map(|arg| unwrap_like(arg, &inner)).collect();
                    return self.value_send(inner, selector, unwrapped);
                }
            }
        }

        // Built-in methods of the receiver's kind, then the base set.
        if let Some(result) = methods::builtin(&receiver, selector, &args)
        {
            return result;
        }

        // Dynamic attributes: `name:` writes, `name` reads.
        if let Some(name) = selector.strip_suffix(':')
        {
            if !name.is_empty() && !name.contains(':')
            {
                if methods::is_known_zero_arg(&receiver, name)
                {
                    return Err(RuntimeError::type_error(format!(
                        "attribute '{name}' collides with a built-in method of {}",
                        receiver.kind_name()
                    )));
                }
                if class.find_method(name).is_some()
                {
                    return Err(RuntimeError::type_error(format!(
                        "attribute '{name}' would shadow a method of {}",
                        class.name
                    )));
                }
                if let Some(value) = args.into_iter().next()
                {
                    receiver.attr_set(intern::name(name), value);
                }
                return Ok(receiver);
            }
        }
        else if args.is_empty()
        {
            if let Some(value) = receiver.attr_get(selector)
            {
                return Ok(value);
            }
        }

        Err(RuntimeError::dnu(receiver.kind_name(), selector))
    }

    /// Run a thunk the way `value` would: blocks of the right shape execute
    /// directly, anything else is sent `value`. A receiver that cannot
    /// answer is a type error at this call site, not a DNU.
    pub(crate) fn invoke_value(&mut self, target: Value, context: &str) -> RunResult<Value>
    {
        if let Value::Block(block) = &target
        {
            if block.lit.arity() != 0
            {
                return Err(RuntimeError::type_error(format!(
                    "{context} expects a parameterless block, got arity {}",
                    block.lit.arity()
                )));
            }
            let lit = block.lit.clone();
            let captured = block.captured_self.clone();
            return self.exec_block(&lit, Vec::new(), captured);
        }
        let selector = intern::name("value");
        match self.value_send(target, &selector, Args::new())
        {
            Err(RuntimeError::DoesNotUnderstand(_)) => Err(RuntimeError::type_error(format!(
                "{context} expects a block or a value-answering object"
            ))),
            other => other,
        }
    }

    /// One-argument variant of the thunk helper, used by `timesRepeat:`.
    pub(crate) fn invoke_value_with(
        &mut self,
        target: Value,
        argument: Value,
        context: &str,
    ) -> RunResult<Value>
    {
        if let Value::Block(block) = &target
        {
            if block.lit.arity() != 1
            {
                return Err(RuntimeError::type_error(format!(
                    "{context} expects a one-parameter block, got arity {}",
                    block.lit.arity()
                )));
            }
            let lit = block.lit.clone();
            let captured = block.captured_self.clone();
            return self.exec_block(&lit, vec![argument], captured);
        }
        let selector = intern::name("value:");
        let mut args = Args::new();
        args.push(argument);
        match self.value_send(target, &selector, args)
        {
            Err(RuntimeError::DoesNotUnderstand(_)) => Err(RuntimeError::type_error(format!(
                "{context} expects a block or a value-answering object"
            ))),
            other => other,
        }
    }
}

// `whileTrue:` accepts a block, or an instance of a Block subclass that
// answers `value` itself.
fn answers_value(receiver: &Value) -> bool
{
    match receiver
    {
        Value::Block(_) => true,
        Value::Object(obj) => obj.class.is_or_inherits("Block"),
        _ => false,
    }
}

fn integer_payload(value: &Value) -> Option<i64>
{
    match value
    {
        Value::Integer(n) => Some(*n),
        Value::Object(obj) => match obj.internal.borrow().as_ref()
        {
            Some(Value::Integer(n)) => Some(*n),
            _ => None,
        },
        _ => None,
    }
}

fn string_payload(value: &Value) -> Option<Rc<str>>
{
    match value
    {
        Value::Str(s) => Some(s.clone()),
        Value::Object(obj) => match obj.internal.borrow().as_ref()
        {
            Some(Value::Str(s)) => Some(s.clone()),
            _ => None,
        },
        _ => None,
    }
}

// An object argument whose internal primitive matches the kind of the
// delegation target is unwrapped to that primitive.
fn unwrap_like(arg: &Value, inner: &Value) -> Value
{
    if let Value::Object(obj) = arg
    {
        let internal = obj.internal.borrow();
        match (internal.as_ref(), inner)
        {
            (Some(Value::Integer(n)), Value::Integer(_)) => return Value::Integer(*n),
            (Some(Value::Str(s)), Value::Str(_)) => return Value::Str(s.clone()),
            (Some(Value::Block(b)), Value::Block(_)) => return Value::Block(b.clone()),
            _ => {}
        }
    }
    arg.clone()
}
