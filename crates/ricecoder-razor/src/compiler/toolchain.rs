//! Checks and lowers template programs into images

use crate::{
    diagnostics::{has_errors, Diagnostic, Location},
    model::MemberInfo,
};

use super::{
    image::{AssemblyImage, Instruction, Operand, TypeDefinition},
    syntax::{self, ExprSyntax, StmtSyntax},
    Artifact, CompilationUnit, Toolchain, TypeKind, DYNAMIC_ASSEMBLY, INTEROP_ASSEMBLY,
};

/// Name through which templates address their model
const MODEL_ROOT: &str = "Model";

/// The bundled toolchain
///
/// Member access on typed models is checked at compile time. Dynamic models
/// are only checked at run time and need the dynamic binding references.
#[derive(Debug, Clone, Default)]
pub struct ProgramToolchain;

impl ProgramToolchain {
    /// Create a toolchain
    pub fn new() -> Self {
        Self
    }
}

impl Toolchain for ProgramToolchain {
    fn compile(&self, unit: &CompilationUnit) -> Result<Artifact, Vec<Diagnostic>> {
        let tree = syntax::parse(&unit.source)?;

        let mut checker = Checker {
            diagnostics: Vec::new(),
            members: None,
            helpers: Vec::new(),
            dynamic_supported: unit.references_assembly(DYNAMIC_ASSEMBLY)
                && unit.references_assembly(INTEROP_ASSEMBLY),
            dynamic_reported: false,
            scopes: Vec::new(),
        };

        match unit.find_type(&tree.base_type).map(|ty| &ty.kind) {
            Some(TypeKind::Contract { model, helpers }) => {
                checker.helpers = helpers.clone();
                if let Some(model) = model {
                    match unit.find_type(model).map(|ty| &ty.kind) {
                        Some(TypeKind::Model { members }) => {
                            checker.members = Some(members.clone());
                        }
                        _ => checker.error(
                            "RZC0246",
                            format!("The type '{}' could not be found", model),
                            &tree.template_location,
                        ),
                    }
                }
            }
            _ => checker.error(
                "RZC0246",
                format!("The type '{}' could not be found", tree.base_type),
                &tree.template_location,
            ),
        }

        // Without a contract nothing else can be checked meaningfully
        if checker.has_errors() {
            return Err(checker.diagnostics);
        }

        let body = checker.lower_block(&tree.body);
        if checker.has_errors() {
            return Err(checker.diagnostics);
        }

        let image = AssemblyImage {
            name: unit.assembly_name.clone(),
            types: vec![TypeDefinition {
                name: tree.qualified_name(),
                base_type: tree.base_type.clone(),
                body,
            }],
        };

        match image.encode() {
            Ok(bytes) => Ok(Artifact {
                assembly_name: unit.assembly_name.clone(),
                image: bytes,
                diagnostics: checker.diagnostics,
            }),
            Err(e) => {
                checker
                    .diagnostics
                    .push(Diagnostic::error("RZC7000", format!("Failed to emit image: {}", e)));
                Err(checker.diagnostics)
            }
        }
    }
}

/// Loop variable in scope
struct Local {
    name: String,
    used: bool,
    location: Location,
}

struct Checker {
    diagnostics: Vec<Diagnostic>,
    /// Declared members; `None` when the model is dynamic
    members: Option<Vec<MemberInfo>>,
    helpers: Vec<String>,
    dynamic_supported: bool,
    dynamic_reported: bool,
    scopes: Vec<Local>,
}

impl Checker {
    fn error(&mut self, id: &str, message: impl Into<String>, location: &Location) {
        self.report(Diagnostic::error(id, message), location);
    }

    fn report(&mut self, mut diagnostic: Diagnostic, location: &Location) {
        diagnostic.location = Some(location.clone());
        self.diagnostics.push(diagnostic);
    }

    fn has_errors(&self) -> bool {
        has_errors(&self.diagnostics)
    }

    fn lower_block(&mut self, statements: &[StmtSyntax]) -> Vec<Instruction> {
        statements
            .iter()
            .filter_map(|statement| self.lower_statement(statement))
            .collect()
    }

    fn lower_statement(&mut self, statement: &StmtSyntax) -> Option<Instruction> {
        match statement {
            StmtSyntax::Literal(text) => Some(Instruction::Literal(text.clone())),
            StmtSyntax::Write { expr, location } => {
                self.lower_expr(expr, location).map(Instruction::Write)
            }
            StmtSyntax::Set {
                target,
                value,
                location,
            } => {
                let member = self.check_set_target(target, location);
                let value = self.lower_expr(value, location);
                Some(Instruction::Set {
                    member: member?,
                    value: value?,
                })
            }
            StmtSyntax::If {
                condition,
                then,
                otherwise,
                location,
            } => {
                let condition = self.lower_expr(condition, location);
                let then = self.lower_block(then);
                let otherwise = self.lower_block(otherwise);
                Some(Instruction::Branch {
                    condition: condition?,
                    then,
                    otherwise,
                })
            }
            StmtSyntax::ForEach {
                variable,
                source,
                body,
                location,
            } => {
                let source = self.lower_expr(source, location);

                if variable == MODEL_ROOT || self.scopes.iter().any(|l| &l.name == variable) {
                    self.error(
                        "RZC0136",
                        format!(
                            "A local named '{}' cannot be declared in this scope",
                            variable
                        ),
                        location,
                    );
                }

                self.scopes.push(Local {
                    name: variable.clone(),
                    used: false,
                    location: location.clone(),
                });
                let body = self.lower_block(body);
                if let Some(local) = self.scopes.pop() {
                    if !local.used {
                        self.report(
                            Diagnostic::warning(
                                "RZC0168",
                                format!(
                                    "The variable '{}' is declared but never used",
                                    local.name
                                ),
                            ),
                            &local.location,
                        );
                    }
                }

                Some(Instruction::Loop {
                    variable: variable.clone(),
                    source: source?,
                    body,
                })
            }
        }
    }

    fn check_set_target(&mut self, target: &[String], location: &Location) -> Option<String> {
        let member = match target {
            [root, member] if root == MODEL_ROOT => member.clone(),
            _ => {
                self.error(
                    "RZC0131",
                    format!(
                        "The left-hand side of an assignment must be a model member, got '{}'",
                        target.join(".")
                    ),
                    location,
                );
                return None;
            }
        };

        if !self.check_dynamic_support(location) {
            return None;
        }

        match self.declared_settable(&member) {
            Some(None) => {
                let message = self.missing_member_message(&member);
                self.error("RZC1061", message, location);
                return None;
            }
            Some(Some(false)) => {
                self.error(
                    "RZC0200",
                    format!(
                        "Property 'Model.{}' cannot be assigned to -- it is read only",
                        member
                    ),
                    location,
                );
                return None;
            }
            _ => {}
        }

        Some(member)
    }

    fn lower_expr(&mut self, expr: &ExprSyntax, location: &Location) -> Option<Operand> {
        match expr {
            ExprSyntax::Literal(value) => Some(Operand::Const(value.clone())),
            ExprSyntax::Call { name, args } => {
                let args: Vec<Option<Operand>> =
                    args.iter().map(|arg| self.lower_expr(arg, location)).collect();
                if !self.helpers.iter().any(|h| h == name) {
                    self.error(
                        "RZC0103",
                        format!("The name '{}' does not exist in the current context", name),
                        location,
                    );
                    return None;
                }
                Some(Operand::Call {
                    helper: name.clone(),
                    args: args.into_iter().collect::<Option<Vec<_>>>()?,
                })
            }
            ExprSyntax::Path(path) => self.lower_path(path, location),
        }
    }

    fn lower_path(&mut self, path: &[String], location: &Location) -> Option<Operand> {
        let (root, rest) = path.split_first()?;

        if root == MODEL_ROOT {
            let Some((member, fields)) = rest.split_first() else {
                self.error(
                    "RZC0119",
                    "'Model' must be followed by a member name",
                    location,
                );
                return None;
            };

            if !self.check_dynamic_support(location) {
                return None;
            }

            if let Some(None) = self.declared_settable(member) {
                let message = self.missing_member_message(member);
                self.error("RZC1061", message, location);
                return None;
            }

            return Some(Operand::Model {
                member: member.clone(),
                path: fields.to_vec(),
            });
        }

        if let Some(local) = self.scopes.iter_mut().rev().find(|l| &l.name == root) {
            local.used = true;
            return Some(Operand::Local {
                name: root.clone(),
                path: rest.to_vec(),
            });
        }

        self.error(
            "RZC0103",
            format!("The name '{}' does not exist in the current context", root),
            location,
        );
        None
    }

    /// Dynamic models need the dynamic binding references; reported once
    fn check_dynamic_support(&mut self, location: &Location) -> bool {
        if self.members.is_some() || self.dynamic_supported {
            return true;
        }
        if !self.dynamic_reported {
            self.dynamic_reported = true;
            self.error(
                "RZC0656",
                "Missing compiler required member for dynamic model access; \
                 reference the dynamic binding assemblies",
                location,
            );
        }
        false
    }

    /// `None` for dynamic models, `Some(None)` for undeclared members
    fn declared_settable(&self, member: &str) -> Option<Option<bool>> {
        self.members.as_ref().map(|members| {
            members
                .iter()
                .find(|m| m.name == member)
                .map(|m| m.settable)
        })
    }

    fn missing_member_message(&self, member: &str) -> String {
        format!("The model does not contain a definition for '{}'", member)
    }
}
