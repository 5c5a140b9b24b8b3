use crate::ast::{Assign, BlockLit, Expr, Literal, Program};
use crate::classes::{ClassInfo, ClassRegistry};
use crate::dispatch::{Args, Receiver};
use crate::error::{RunResult, RuntimeError};
use crate::frame::{CallStack, Frame};
use crate::intern;
use crate::value::{self, BlockValue, ObjectData, Value};
use std::io::{self, BufRead, BufReader, Write};
use std::rc::Rc;
use tracing::debug;

/// Where `print` goes: the real stream, or a buffer a test can read back.
pub enum OutputSink {
    Stdout,
    Buffer(String),
}

impl OutputSink {
    fn write(&mut self, text: &str) {
        match self {
            OutputSink::Stdout => {
                print!("{text}");
                let _ = io::stdout().flush();
            }
            OutputSink::Buffer(buffer) => buffer.push_str(text),
        }
    }

    pub fn take(&mut self) -> String {
        match self {
            OutputSink::Stdout => String::new(),
            OutputSink::Buffer(buffer) => std::mem::take(buffer),
        }
    }
}

pub struct Interpreter {
    pub(crate) classes: ClassRegistry,
    pub(crate) stack: CallStack,
    out: OutputSink,
    input: Box<dyn BufRead>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_io(OutputSink::Stdout, Box::new(BufReader::new(io::stdin())))
    }

    pub fn with_io(out: OutputSink, input: Box<dyn BufRead>) -> Self {
        value::reset_singleton_attrs();
        Self {
            classes: ClassRegistry::with_builtins(),
            stack: CallStack::new(),
            out,
            input,
        }
    }

    pub fn take_output(&mut self) -> String {
        self.out.take()
    }

    /// Register the program's classes, then check the `Main`/`run` entry
    /// point exists.
    pub fn load_program(&mut self, program: &Program) -> RunResult<()> {
        for class in &program.classes {
            self.classes.add_class(class.name.clone(), &class.parent, &class.methods)?;
        }
        self.classes.require_main()?;
        Ok(())
    }

    /// Instantiate `Main` and send it `run`.
    pub fn run_main(&mut self) -> RunResult<Value> {
        let main_class = self.classes.require_main()?;
        let instance = self.allocate(&main_class);
        debug!("running Main");
        self.send(Receiver::Value(instance), &intern::name("run"), Args::new())
    }

    /// A fresh instance of a user class. Subclasses of Integer and String
    /// start out behaving as 0 and "".
    pub(crate) fn allocate(&self, class: &Rc<ClassInfo>) -> Value {
        let internal = if class.is_or_inherits("Integer") {
            Some(Value::Integer(0))
        } else if class.is_or_inherits("String") {
            Some(Value::Str(intern::name("")))
        } else {
            None
        };
        Value::Object(ObjectData::new(class.clone(), internal))
    }

    pub(crate) fn eval_expr(&mut self, expr: &Expr) -> RunResult<Value> {
        match expr {
            Expr::Literal(Literal::Nil) => Ok(Value::Nil),
            Expr::Literal(Literal::True) => Ok(Value::True),
            Expr::Literal(Literal::False) => Ok(Value::False),
            Expr::Literal(Literal::Integer(n)) => Ok(Value::Integer(*n)),
            Expr::Literal(Literal::Str(s)) => Ok(Value::Str(s.clone())),
            Expr::Literal(Literal::Class(name)) => Err(RuntimeError::type_error(format!(
                "class literal '{name}' is only valid as a message receiver"
            ))),
            Expr::Var(name) => self.stack.current()?.get(name),
            Expr::Block(lit) => {
                // The block remembers the `self` in scope at the point the
                // literal is evaluated, not at the point it later runs.
                let captured = self.stack.current()?.receiver().cloned();
                Ok(Value::Block(BlockValue::new(lit.clone(), captured)))
            }
            Expr::Send { selector, receiver, args } => {
                let target = self.eval_receiver(receiver)?;
                let mut values = Args::new();
                for arg in args {
                    values.push(self.eval_expr(arg)?);
                }
                self.send(target, selector, values)
            }
        }
    }

    /// Receiver position admits two shapes a value never takes: a class
    /// literal and the word `super`.
    fn eval_receiver(&mut self, expr: &Expr) -> RunResult<Receiver> {
        match expr {
            Expr::Literal(Literal::Class(name)) => {
                let class = self
                    .classes
                    .get(name)
                    .ok_or_else(|| RuntimeError::undefined(name))?;
                Ok(Receiver::Class(class))
            }
            Expr::Var(name) if &**name == "super" => Ok(Receiver::Super),
            other => Ok(Receiver::Value(self.eval_expr(other)?)),
        }
    }

    /// Run a block body in a fresh frame. The frame is popped on every exit
    /// path; errors pass through after the pop.
    pub(crate) fn exec_block(
        &mut self,
        lit: &Rc<BlockLit>,
        args: Vec<Value>,
        receiver: Option<Value>,
    ) -> RunResult<Value> {
        if args.len() != lit.arity() {
            return Err(RuntimeError::BadArity(format!(
                "block expects {} arguments, got {}",
                lit.arity(),
                args.len()
            )));
        }
        let mut frame = Frame::new(receiver);
        for (name, value) in lit.params.iter().zip(args) {
            frame.define_parameter(name.clone(), value)?;
        }
        self.stack.push(frame);
        let result = self.run_body(&lit.body);
        self.stack.pop();
        result
    }

    fn run_body(&mut self, body: &[Assign]) -> RunResult<Value> {
        let mut last = Value::Nil;
        for statement in body {
            let value = self.eval_expr(&statement.expr)?;
            self.stack
                .current_mut()?
                .define_or_update_variable(statement.target.clone(), value.clone())?;
            last = value;
        }
        Ok(last)
    }

    pub(crate) fn write_stdout(&mut self, text: &str) {
        self.out.write(text);
    }

    /// One line from standard input, without its terminator; the empty
    /// string at end of input.
    pub(crate) fn read_line(&mut self) -> RunResult<Rc<str>> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => Ok(intern::name("")),
            Ok(_) => {
                if line.ends_with('\n') {
                    line.pop();
                    if line.ends_with('\r') {
                        line.pop();
                    }
                }
                Ok(intern::name_owned(line))
            }
            Err(err) => Err(RuntimeError::internal(format!("stdin read failed: {err}"))),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
