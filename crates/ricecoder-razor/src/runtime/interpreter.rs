//! Execution of compiled template bodies

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};

use crate::{
    compiler::{Instruction, Operand},
    error::{RazorError, Result},
    model::Value,
};

use super::{Template, TemplateBase};

/// Template instance backed by a compiled body
#[derive(Debug, Clone)]
pub struct ProgramTemplate {
    body: Arc<[Instruction]>,
}

impl ProgramTemplate {
    /// Create an instance sharing a loaded body
    pub fn new(body: Arc<[Instruction]>) -> Self {
        Self { body }
    }
}

#[async_trait]
impl Template for ProgramTemplate {
    async fn execute(&self, base: &mut TemplateBase<'_>) -> Result<()> {
        let mut frame = Frame::default();
        run_block(&self.body, base, &mut frame).await?;
        base.flush().await
    }
}

/// Loop variables in scope, innermost last
#[derive(Default)]
struct Frame {
    locals: Vec<(String, Value)>,
}

impl Frame {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.locals
            .iter()
            .rev()
            .find(|(local, _)| local == name)
            .map(|(_, value)| value)
    }
}

fn run_block<'f, 'b>(
    block: &'f [Instruction],
    base: &'f mut TemplateBase<'b>,
    frame: &'f mut Frame,
) -> BoxFuture<'f, Result<()>>
where
    'b: 'f,
{
    async move {
        for instruction in block {
            match instruction {
                Instruction::Literal(text) => base.write_literal(text).await?,
                Instruction::Write(operand) => {
                    let value = evaluate(operand, base, frame)?;
                    base.write(&value).await?;
                }
                Instruction::Set { member, value } => {
                    let value = evaluate(value, base, frame)?;
                    base.model_mut().set(member, value)?;
                }
                Instruction::Branch {
                    condition,
                    then,
                    otherwise,
                } => {
                    let taken = if is_truthy(&evaluate(condition, base, frame)?) {
                        then
                    } else {
                        otherwise
                    };
                    run_block(taken, base, frame).await?;
                }
                Instruction::Loop {
                    variable,
                    source,
                    body,
                } => {
                    let items = match evaluate(source, base, frame)? {
                        Value::Array(items) => items,
                        Value::Null => Vec::new(),
                        other => {
                            return Err(RazorError::Execution(format!(
                                "Cannot iterate over {} in foreach over '{}'",
                                kind_of(&other),
                                variable
                            )))
                        }
                    };
                    for item in items {
                        frame.locals.push((variable.clone(), item));
                        let result = run_block(body, base, frame).await;
                        frame.locals.pop();
                        result?;
                    }
                }
            }
        }
        Ok(())
    }
    .boxed()
}

fn evaluate(operand: &Operand, base: &TemplateBase<'_>, frame: &Frame) -> Result<Value> {
    match operand {
        Operand::Const(value) => Ok(value.clone()),
        Operand::Model { member, path } => {
            let value = base.model().get(member)?;
            Ok(walk(value, path))
        }
        Operand::Local { name, path } => {
            let value = frame.lookup(name).cloned().ok_or_else(|| {
                RazorError::Execution(format!("Variable '{}' is not in scope", name))
            })?;
            Ok(walk(value, path))
        }
        Operand::Call { helper, args } => {
            let args = args
                .iter()
                .map(|arg| evaluate(arg, base, frame))
                .collect::<Result<Vec<_>>>()?;
            base.call_helper(helper, &args)
        }
    }
}

/// Follow object fields; a missing field yields `null`
fn walk(mut value: Value, path: &[String]) -> Value {
    for field in path {
        value = match value {
            Value::Object(mut fields) => fields.remove(field).unwrap_or(Value::Null),
            _ => Value::Null,
        };
    }
    value
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        contract::Helper,
        model::{tests::Person, AnonymousModel, MemberAccess, TypedBinding},
        runtime::render_value,
    };
    use serde_json::json;

    fn model(member: &str) -> Operand {
        Operand::Model {
            member: member.to_string(),
            path: Vec::new(),
        }
    }

    fn local(name: &str, path: &[&str]) -> Operand {
        Operand::Local {
            name: name.to_string(),
            path: path.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn join(args: &[Value]) -> std::result::Result<Value, String> {
        let parts: Vec<String> = args
            .iter()
            .map(|a| render_value(a).unwrap_or_default())
            .collect();
        Ok(json!(parts.join("-")))
    }

    fn fail(_args: &[Value]) -> std::result::Result<Value, String> {
        Err("boom".to_string())
    }

    async fn run<A: MemberAccess>(body: Vec<Instruction>, access: &mut A) -> Result<String> {
        let helpers = vec![Helper::new("Join", join), Helper::new("Fail", fail)];
        let template = ProgramTemplate::new(body.into());
        let mut out: Vec<u8> = Vec::new();
        {
            let mut base = TemplateBase::new(&mut out, access, &helpers);
            template.execute(&mut base).await?;
        }
        Ok(String::from_utf8(out)?)
    }

    #[tokio::test]
    async fn test_literal_and_member() {
        let mut value = json!({"Name": "Ada", "Missing": null});
        let mut access = AnonymousModel::new(&mut value);
        let output = run(
            vec![
                Instruction::Literal("Hi ".to_string()),
                Instruction::Write(model("Name")),
                Instruction::Write(model("Missing")),
            ],
            &mut access,
        )
        .await
        .unwrap();
        assert_eq!(output, "Hi Ada");
    }

    #[tokio::test]
    async fn test_set_then_read_on_anonymous_model() {
        let mut value = json!({});
        let mut access = AnonymousModel::new(&mut value);
        let output = run(
            vec![
                Instruction::Set {
                    member: "Extra".to_string(),
                    value: Operand::Const(json!(7)),
                },
                Instruction::Write(model("Extra")),
            ],
            &mut access,
        )
        .await
        .unwrap();
        assert_eq!(output, "7");
        assert_eq!(access.custom_members().get("Extra"), Some(&json!(7)));
    }

    #[tokio::test]
    async fn test_loops_and_branches() {
        let mut value = json!({
            "Items": [{"Title": "a", "On": true}, {"Title": "b", "On": false}],
        });
        let mut access = AnonymousModel::new(&mut value);
        let output = run(
            vec![Instruction::Loop {
                variable: "x".to_string(),
                source: model("Items"),
                body: vec![Instruction::Branch {
                    condition: local("x", &["On"]),
                    then: vec![Instruction::Write(local("x", &["Title"]))],
                    otherwise: vec![Instruction::Literal("-".to_string())],
                }],
            }],
            &mut access,
        )
        .await
        .unwrap();
        assert_eq!(output, "a-");
    }

    #[tokio::test]
    async fn test_loop_over_non_array_fails() {
        let mut value = json!({"Items": "abc"});
        let mut access = AnonymousModel::new(&mut value);
        let err = run(
            vec![Instruction::Loop {
                variable: "x".to_string(),
                source: model("Items"),
                body: Vec::new(),
            }],
            &mut access,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RazorError::Execution(_)));
    }

    #[tokio::test]
    async fn test_helpers() {
        let mut value = json!({"A": 1});
        let mut access = AnonymousModel::new(&mut value);
        let output = run(
            vec![Instruction::Write(Operand::Call {
                helper: "Join".to_string(),
                args: vec![model("A"), Operand::Const(json!("b"))],
            })],
            &mut access,
        )
        .await
        .unwrap();
        assert_eq!(output, "1-b");

        let err = run(
            vec![Instruction::Write(Operand::Call {
                helper: "Fail".to_string(),
                args: Vec::new(),
            })],
            &mut access,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RazorError::Execution(msg) if msg.contains("boom")));
    }

    #[tokio::test]
    async fn test_missing_member_on_typed_model() {
        let mut person = Person::default();
        let mut access = TypedBinding::new(&mut person);
        let err = run(vec![Instruction::Write(model("Nickname"))], &mut access)
            .await
            .unwrap_err();
        assert!(matches!(err, RazorError::MissingMember(name) if name == "Nickname"));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!({})));
    }

    #[test]
    fn test_walk_missing_field_is_null() {
        assert_eq!(walk(json!({"a": {"b": 1}}), &["a".into(), "b".into()]), json!(1));
        assert_eq!(walk(json!({"a": 1}), &["a".into(), "b".into()]), Value::Null);
    }
}
