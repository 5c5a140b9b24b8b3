use crate::ast::{Assign, BlockLit, ClassDef, Expr, Literal, MethodDef, Program};
use crate::classes::is_class_name;
use crate::error::{RunResult, RuntimeError};
use crate::intern;
use roxmltree::{Document, Node};
use std::rc::Rc;

// The XML pass: walks an already-parsed DOM into the program structures.
// Every violation of the document shape is a type error.

pub fn parse_program(source: &str) -> RunResult<Program>
{
    let document = Document::parse(source)
        .map_err(|err| RuntimeError::type_error(format!("malformed XML document: {err}")))?;
    let root = document.root_element();
    if root.tag_name().name() != "program"
    {
        return Err(shape_error("root element must be 'program'"));
    }
    match root.attribute("language")
    {
        Some(lang) if lang.eq_ignore_ascii_case("SOL25") => {}
        Some(lang) =>
        {
            return Err(shape_error(format!("unsupported language '{lang}'")));
        }
        None => return Err(shape_error("'program' requires a 'language' attribute")),
    }

    let mut classes = Vec::new();
    for child in element_children(&root)
    {
        if child.tag_name().name() != "class"
        {
            return Err(unexpected(&child, "inside 'program'"));
        }
        classes.push(parse_class(&child)?);
    }
    Ok(Program { classes })
}

fn parse_class(node: &Node) -> RunResult<ClassDef>
{
    let name = required_attr(node, "name")?;
    let parent = required_attr(node, "parent")?;
    if !is_class_name(name)
    {
        return Err(shape_error(format!("'{name}' is not a valid class name")));
    }
    if !is_class_name(parent)
    {
        return Err(shape_error(format!("'{parent}' is not a valid class name")));
    }

    let mut methods = Vec::new();
    for child in element_children(node)
    {
        if child.tag_name().name() != "method"
        {
            return Err(unexpected(&child, &format!("inside class '{name}'")));
        }
        methods.push(parse_method(&child)?);
    }
    Ok(ClassDef {
        name: intern::name(name),
        parent: intern::name(parent),
        methods,
    })
}

fn parse_method(node: &Node) -> RunResult<MethodDef>
{
    let selector = required_attr(node, "selector")?;
    if !is_selector(selector)
    {
        return Err(shape_error(format!("'{selector}' is not a valid selector")));
    }
    let children: Vec<Node> = element_children(node).collect();
    let [block] = children.as_slice()
    else
    {
        return Err(shape_error(format!(
            "method '{selector}' must contain exactly one block"
        )));
    };
    if block.tag_name().name() != "block"
    {
        return Err(unexpected(block, &format!("inside method '{selector}'")));
    }
    Ok(MethodDef {
        selector: intern::name(selector),
        body: Rc::new(parse_block(block)?),
    })
}

fn parse_block(node: &Node) -> RunResult<BlockLit>
{
    let arity: usize = required_attr(node, "arity")?
        .parse()
        .map_err(|_| shape_error("block 'arity' must be a non-negative integer"))?;

    let mut params: Vec<(u64, Rc<str>)> = Vec::new();
    let mut assigns: Vec<(u64, Assign)> = Vec::new();
    for child in element_children(node)
    {
        match child.tag_name().name()
        {
            "parameter" =>
            {
                let name = required_attr(&child, "name")?;
                if !is_identifier(name)
                {
                    return Err(shape_error(format!(
                        "'{name}' is not a valid parameter name"
                    )));
                }
                params.push((parse_order(&child)?, intern::name(name)));
            }
            "assign" => assigns.push(parse_assign(&child)?),
            _ => return Err(unexpected(&child, "inside 'block'")),
        }
    }

    // Parameters are declared 1..n with no gaps; statements only need
    // distinct orders, execution sorts them.
    params.sort_by_key(|(order, _)| *order);
    for (position, (order, _)) in params.iter().enumerate()
    {
        if *order != position as u64 + 1
        {
            return Err(shape_error("parameter orders must be sequential from 1"));
        }
    }
    if params.len() != arity
    {
        return Err(shape_error(format!(
            "block declares arity {arity} but has {} parameters",
            params.len()
        )));
    }

    assigns.sort_by_key(|(order, _)| *order);
    for window in assigns.windows(2)
    {
        if window[0].0 == window[1].0
        {
            return Err(shape_error("assign orders must be distinct"));
        }
    }

    Ok(BlockLit {
        params: params.into_iter().map(|(_, name)| name).collect(),
        body: assigns.into_iter().map(|(_, assign)| assign).collect(),
    })
}

fn parse_assign(node: &Node) -> RunResult<(u64, Assign)>
{
    let order = parse_order(node)?;
    let mut target = None;
    let mut expr = None;
    for child in element_children(node)
    {
        match child.tag_name().name()
        {
            "var" if target.is_none() =>
            {
                let name = required_attr(&child, "name")?;
                if !is_identifier(name)
                {
                    return Err(shape_error(format!(
                        "'{name}' is not a valid variable name"
                    )));
                }
                target = Some(intern::name(name));
            }
            "expr" if expr.is_none() => expr = Some(parse_expr(&child)?),
            _ => return Err(unexpected(&child, "inside 'assign'")),
        }
    }
    match (target, expr)
    {
        (Some(target), Some(expr)) => Ok((order, Assign { target, expr })),
        _ => Err(shape_error("assign requires one 'var' and one 'expr'")),
    }
}

fn parse_expr(node: &Node) -> RunResult<Expr>
{
    let children: Vec<Node> = element_children(node).collect();
    let [child] = children.as_slice()
    else
    {
        return Err(shape_error("'expr' must contain exactly one element"));
    };
    match child.tag_name().name()
    {
        "literal" => parse_literal(child),
        "var" =>
        {
            let name = required_attr(child, "name")?;
            if !is_identifier(name)
            {
                return Err(shape_error(format!("'{name}' is not a valid variable name")));
            }
            Ok(Expr::Var(intern::name(name)))
        }
        "send" => parse_send(child),
        "block" => Ok(Expr::Block(Rc::new(parse_block(child)?))),
        _ => Err(unexpected(child, "inside 'expr'")),
    }
}

fn parse_literal(node: &Node) -> RunResult<Expr>
{
    let class = required_attr(node, "class")?;
    let literal = match class
    {
        "Nil" => Literal::Nil,
        "True" => Literal::True,
        "False" => Literal::False,
        "Integer" =>
        {
            let raw = required_attr(node, "value")?;
            let value: i64 = raw
                .parse()
                .map_err(|_| shape_error(format!("'{raw}' is not a valid Integer literal")))?;
            Literal::Integer(value)
        }
        "String" =>
        {
            let raw = required_attr(node, "value")?;
            Literal::Str(intern::name_owned(unescape(raw)))
        }
        "class" =>
        {
            let name = required_attr(node, "value")?;
            if !is_class_name(name)
            {
                return Err(shape_error(format!("'{name}' is not a valid class name")));
            }
            Literal::Class(intern::name(name))
        }
        other => return Err(shape_error(format!("unknown literal class '{other}'"))),
    };
    Ok(Expr::Literal(literal))
}

fn parse_send(node: &Node) -> RunResult<Expr>
{
    let selector = required_attr(node, "selector")?;
    if !is_selector(selector)
    {
        return Err(shape_error(format!("'{selector}' is not a valid selector")));
    }

    let children: Vec<Node> = element_children(node).collect();
    let Some((receiver_node, arg_nodes)) = children.split_first()
    else
    {
        return Err(shape_error(format!("send '{selector}' is missing its receiver")));
    };
    if receiver_node.tag_name().name() != "expr"
    {
        return Err(shape_error(format!(
            "the first child of send '{selector}' must be the receiver 'expr'"
        )));
    }
    let receiver = parse_expr(receiver_node)?;

    let mut args: Vec<(u64, Expr)> = Vec::new();
    for arg in arg_nodes
    {
        if arg.tag_name().name() != "arg"
        {
            return Err(unexpected(arg, &format!("inside send '{selector}'")));
        }
        let order = parse_order(arg)?;
        let inner: Vec<Node> = element_children(arg).collect();
        let [expr_node] = inner.as_slice()
        else
        {
            return Err(shape_error("'arg' must contain exactly one 'expr'"));
        };
        if expr_node.tag_name().name() != "expr"
        {
            return Err(unexpected(expr_node, "inside 'arg'"));
        }
        args.push((order, parse_expr(expr_node)?));
    }
    args.sort_by_key(|(order, _)| *order);
    for window in args.windows(2)
    {
        if window[0].0 == window[1].0
        {
            return Err(shape_error("arg orders must be distinct"));
        }
    }

    Ok(Expr::Send {
        selector: intern::name(selector),
        receiver: Box::new(receiver),
        args: args.into_iter().map(|(_, expr)| expr).collect(),
    })
}

// One left-to-right pass; only \n, \' and \\ are recognized, anything else
// keeps its backslash.
fn unescape(raw: &str) -> String
{
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next()
    {
        if c != '\\'
        {
            out.push(c);
            continue;
        }
        match chars.next()
        {
            Some('n') => out.push('\n'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some(other) =>
            {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn element_children<'a, 'input>(node: &'a Node<'a, 'input>)
    -> impl Iterator<Item = Node<'a, 'input>>
{
    node.children().filter(|child| child.is_element())
}

fn required_attr<'a>(node: &Node<'a, '_>, name: &str) -> RunResult<&'a str>
{
    node.attribute(name).ok_or_else(|| {
        shape_error(format!(
            "'{}' requires a '{name}' attribute",
            node.tag_name().name()
        ))
    })
}

fn parse_order(node: &Node) -> RunResult<u64>
{
    let raw = required_attr(node, "order")?;
    match raw.parse::<u64>()
    {
        Ok(order) if order >= 1 => Ok(order),
        _ => Err(shape_error(format!("'{raw}' is not a valid order"))),
    }
}

fn shape_error(message: impl Into<String>) -> RuntimeError
{
    RuntimeError::type_error(message)
}

fn unexpected(node: &Node, place: &str) -> RuntimeError
{
    shape_error(format!(
        "unexpected element '{}' {place}",
        node.tag_name().name()
    ))
}

fn is_identifier(name: &str) -> bool
{
    let mut chars = name.chars();
    match chars.next()
    {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_selector(selector: &str) -> bool
{
    if selector.is_empty() || selector.starts_with(':')
    {
        return false;
    }
    selector
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn accepts_a_minimal_program()
    {
        let program = parse_program(
            r#"<program language="SOL25">
                 <class name="Main" parent="Object">
                   <method selector="run">
                     <block arity="0"/>
                   </method>
                 </class>
               </program>"#,
        )
        .unwrap();
        assert_eq!(program.classes.len(), 1);
        assert_eq!(&*program.classes[0].name, "Main");
        assert_eq!(&*program.classes[0].methods[0].selector, "run");
    }

    #[test]
    fn language_attribute_is_case_insensitive()
    {
        assert!(parse_program(r#"<program language="sol25"/>"#).is_ok());
        assert!(parse_program(r#"<program language="SOL24"/>"#).is_err());
        assert!(parse_program(r#"<program/>"#).is_err());
    }

    #[test]
    fn statements_are_sorted_by_order()
    {
        let program = parse_program(
            r#"<program language="SOL25">
                 <class name="Main" parent="Object">
                   <method selector="run">
                     <block arity="0">
                       <assign order="2">
                         <var name="b"/>
                         <expr><literal class="Integer" value="2"/></expr>
                       </assign>
                       <assign order="1">
                         <var name="a"/>
                         <expr><literal class="Integer" value="1"/></expr>
                       </assign>
                     </block>
                   </method>
                 </class>
               </program>"#,
        )
        .unwrap();
        let body = &program.classes[0].methods[0].body.body;
        assert_eq!(&*body[0].target, "a");
        assert_eq!(&*body[1].target, "b");
    }

    #[test]
    fn duplicate_assign_orders_are_rejected()
    {
        let err = parse_program(
            r#"<program language="SOL25">
                 <class name="Main" parent="Object">
                   <method selector="run">
                     <block arity="0">
                       <assign order="1">
                         <var name="a"/>
                         <expr><literal class="Nil" value="nil"/></expr>
                       </assign>
                       <assign order="1">
                         <var name="b"/>
                         <expr><literal class="Nil" value="nil"/></expr>
                       </assign>
                     </block>
                   </method>
                 </class>
               </program>"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), 52);
    }

    #[test]
    fn arity_must_match_parameter_count()
    {
        let err = parse_program(
            r#"<program language="SOL25">
                 <class name="Main" parent="Object">
                   <method selector="run">
                     <block arity="2">
                       <parameter name="x" order="1"/>
                     </block>
                   </method>
                 </class>
               </program>"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), 52);
    }

    #[test]
    fn parameter_orders_must_be_sequential()
    {
        let err = parse_program(
            r#"<program language="SOL25">
                 <class name="Main" parent="Object">
                   <method selector="run">
                     <block arity="2">
                       <parameter name="x" order="1"/>
                       <parameter name="y" order="3"/>
                     </block>
                   </method>
                 </class>
               </program>"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), 52);
    }

    #[test]
    fn expr_requires_exactly_one_child()
    {
        let err = parse_program(
            r#"<program language="SOL25">
                 <class name="Main" parent="Object">
                   <method selector="run">
                     <block arity="0">
                       <assign order="1">
                         <var name="a"/>
                         <expr>
                           <literal class="Integer" value="1"/>
                           <literal class="Integer" value="2"/>
                         </expr>
                       </assign>
                     </block>
                   </method>
                 </class>
               </program>"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), 52);
    }

    #[test]
    fn string_escapes_are_applied_once()
    {
        assert_eq!(unescape(r"line\n"), "line\n");
        assert_eq!(unescape(r"it\'s"), "it's");
        assert_eq!(unescape(r"a\\n"), r"a\n");
        assert_eq!(unescape(r"odd\q"), r"odd\q");
    }

    #[test]
    fn send_arguments_are_sorted_by_order()
    {
        let program = parse_program(
            r#"<program language="SOL25">
                 <class name="Main" parent="Object">
                   <method selector="run">
                     <block arity="0">
                       <assign order="1">
                         <var name="a"/>
                         <expr>
                           <send selector="startsWith:endsBefore:">
                             <expr><literal class="String" value="abc"/></expr>
                             <arg order="2"><expr><literal class="Integer" value="3"/></expr></arg>
                             <arg order="1"><expr><literal class="Integer" value="1"/></expr></arg>
                           </send>
                         </expr>
                       </assign>
                     </block>
                   </method>
                 </class>
               </program>"#,
        )
        .unwrap();
        let Expr::Send { args, .. } = &program.classes[0].methods[0].body.body[0].expr
        else
        {
            panic!("expected a send");
        };
        assert_eq!(args[0], Expr::Literal(Literal::Integer(1)));
        assert_eq!(args[1], Expr::Literal(Literal::Integer(3)));
    }

    #[test]
    fn malformed_xml_is_a_type_error()
    {
        let err = parse_program("<program language='SOL25'>").unwrap_err();
        assert_eq!(err.code(), 52);
    }

    #[test]
    fn bad_integer_literal_is_rejected()
    {
        let err = parse_program(
            r#"<program language="SOL25">
                 <class name="Main" parent="Object">
                   <method selector="run">
                     <block arity="0">
                       <assign order="1">
                         <var name="a"/>
                         <expr><literal class="Integer" value="twelve"/></expr>
                       </assign>
                     </block>
                   </method>
                 </class>
               </program>"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), 52);
    }
}
