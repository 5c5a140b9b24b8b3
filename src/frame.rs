use crate::error::{RunResult, RuntimeError};
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::rc::Rc;

pub const RESERVED_NAMES: [&str; 5] = ["self", "super", "nil", "true", "false"];

pub fn is_reserved(name: &str) -> bool
{
    RESERVED_NAMES.contains(&name)
}

/// One block execution: the receiver it runs for, its parameters (write-once
/// at creation) and its locals (created by assignment).
#[derive(Debug)]
pub struct Frame
{
    receiver: Option<Value>,
    params: FxHashMap<Rc<str>, Value>,
    locals: FxHashMap<Rc<str>, Value>,
}

impl Frame
{
    pub fn new(receiver: Option<Value>) -> Self
    {
        Self {
            receiver,
            params: FxHashMap::default(),
            locals: FxHashMap::default(),
        }
    }

    pub fn receiver(&self) -> Option<&Value>
    {
        self.receiver.as_ref()
    }

    /// Called once per declared parameter while the frame is being built.
    pub fn define_parameter(&mut self, name: Rc<str>, value: Value) -> RunResult<()>
    {
        if is_reserved(&name)
        {
            return Err(RuntimeError::NameCollision(format!(
                "'{name}' is reserved and cannot be a parameter"
            )));
        }
        if self.params.contains_key(&name)
        {
            return Err(RuntimeError::NameCollision(format!(
                "duplicate parameter '{name}'"
            )));
        }
        self.params.insert(name, value);
        Ok(())
    }

    /// Assignment target: creates or updates a local. Parameters and reserved
    /// names are not assignable.
    pub fn define_or_update_variable(&mut self, name: Rc<str>, value: Value) -> RunResult<()>
    {
        if is_reserved(&name)
        {
            return Err(RuntimeError::NameCollision(format!(
                "cannot assign to reserved name '{name}'"
            )));
        }
        if self.params.contains_key(&name)
        {
            return Err(RuntimeError::NameCollision(format!(
                "cannot assign to parameter '{name}'"
            )));
        }
        self.locals.insert(name, value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> RunResult<Value>
    {
        match name
        {
            "nil" => return Ok(Value::Nil),
            "true" => return Ok(Value::True),
            "false" => return Ok(Value::False),
            "self" =>
            {
                return self.receiver.clone().ok_or_else(|| {
                    RuntimeError::type_error("'self' is not bound in this block")
                });
            }
            "super" =>
            {
                return Err(RuntimeError::type_error(
                    "'super' is only valid as a message receiver",
                ));
            }
            _ => {}
        }
        if let Some(value) = self.params.get(name)
        {
            return Ok(value.clone());
        }
        if let Some(value) = self.locals.get(name)
        {
            return Ok(value.clone());
        }
        Err(RuntimeError::undefined(name))
    }
}

/// LIFO of frames; only the top frame is visible to the evaluator.
pub struct CallStack
{
    frames: Vec<Frame>,
}

impl CallStack
{
    pub fn new() -> Self
    {
        Self { frames: Vec::new() }
    }

    pub fn push(&mut self, frame: Frame)
    {
        self.frames.push(frame);
    }

    pub fn pop(&mut self)
    {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize
    {
        self.frames.len()
    }

    pub fn current(&self) -> RunResult<&Frame>
    {
        self.frames
            .last()
            .ok_or_else(|| RuntimeError::internal("no active frame"))
    }

    pub fn current_mut(&mut self) -> RunResult<&mut Frame>
    {
        self.frames
            .last_mut()
            .ok_or_else(|| RuntimeError::internal("no active frame"))
    }
}

impl Default for CallStack
{
    fn default() -> Self
    {
        Self::new()
    }
}
