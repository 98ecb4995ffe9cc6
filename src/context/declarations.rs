//! Immutable registry of program declarations, indexed by name.
//!
//! Built once per interpreter and shared behind an `Arc` by every request
//! context. Backend health is the only state that changes afterwards, and it
//! lives in an atomic inside [`Backend`].

use crate::ast::{
    Declaration, NamedDeclaration, Program, Statement, StatementKind, SubroutineDeclaration,
    TableDeclaration,
};
use crate::error::{InterpreterError, InterpreterResult};
use crate::value::{Acl, Backend};
use std::collections::HashMap;
use std::sync::Arc;

/// Declarations indexed by name.
#[derive(Debug, Default)]
pub struct Declarations {
    /// Backends and directors.
    pub backends: HashMap<String, Arc<Backend>>,
    /// Access-control lists.
    pub acls: HashMap<String, Arc<Acl>>,
    /// Edge dictionaries.
    pub tables: HashMap<String, TableDeclaration>,
    /// Lifecycle and custom subroutines.
    pub subroutines: HashMap<String, SubroutineDeclaration>,
    /// Subroutines with a return type, callable from expressions.
    pub functional_subroutines: HashMap<String, SubroutineDeclaration>,
    /// Penalty boxes.
    pub penaltyboxes: HashMap<String, NamedDeclaration>,
    /// Rate counters.
    pub ratecounters: HashMap<String, NamedDeclaration>,
    /// Goto label to the subroutine declaring it.
    pub gotos: HashMap<String, String>,
    /// First declared origin backend; the initial `req.backend`.
    pub default_backend: Option<String>,
}

fn duplicate(kind: &str, name: &str) -> InterpreterError {
    InterpreterError::Config(format!("{kind} {name} is declared more than once"))
}

fn insert_unique<V>(map: &mut HashMap<String, V>, kind: &str, name: &str, value: V) -> InterpreterResult<()> {
    if map.insert(name.to_string(), value).is_some() {
        return Err(duplicate(kind, name));
    }
    Ok(())
}

impl Declarations {
    /// Index every declaration of `program`.
    pub fn load(program: &Program) -> InterpreterResult<Self> {
        let mut declarations = Declarations::default();
        for declaration in &program.declarations {
            match declaration {
                Declaration::Acl(acl) => {
                    let parsed = Acl::from_declaration(acl)
                        .map_err(|err| InterpreterError::from(err).at(&acl.token))?;
                    insert_unique(&mut declarations.acls, "acl", &acl.name, Arc::new(parsed))?;
                }
                Declaration::Backend(backend) => {
                    if declarations.default_backend.is_none() {
                        declarations.default_backend = Some(backend.name.clone());
                    }
                    let value = Arc::new(Backend::origin(backend.clone()));
                    insert_unique(&mut declarations.backends, "backend", &backend.name, value)?;
                }
                Declaration::Director(director) => {
                    let value = Arc::new(Backend::director(director.clone()));
                    insert_unique(&mut declarations.backends, "backend", &director.name, value)?;
                }
                Declaration::Table(table) => {
                    insert_unique(&mut declarations.tables, "table", &table.name, table.clone())?;
                }
                Declaration::Subroutine(subroutine) => {
                    collect_gotos(&subroutine.name, &subroutine.body, &mut declarations.gotos)?;
                    let target = if subroutine.return_type.is_some() {
                        &mut declarations.functional_subroutines
                    } else {
                        &mut declarations.subroutines
                    };
                    insert_unique(target, "subroutine", &subroutine.name, subroutine.clone())?;
                }
                Declaration::Penaltybox(penaltybox) => {
                    insert_unique(
                        &mut declarations.penaltyboxes,
                        "penaltybox",
                        &penaltybox.name,
                        penaltybox.clone(),
                    )?;
                }
                Declaration::Ratecounter(ratecounter) => {
                    insert_unique(
                        &mut declarations.ratecounters,
                        "ratecounter",
                        &ratecounter.name,
                        ratecounter.clone(),
                    )?;
                }
            }
        }
        tracing::debug!(
            backends = declarations.backends.len(),
            subroutines = declarations.subroutines.len(),
            tables = declarations.tables.len(),
            "declarations loaded"
        );
        Ok(declarations)
    }

    /// Backend or director by name.
    pub fn backend(&self, name: &str) -> Option<&Arc<Backend>> {
        self.backends.get(name)
    }

    /// Backend a request starts with before `vcl_recv` picks one.
    pub fn default_backend(&self) -> Option<&Arc<Backend>> {
        self.default_backend.as_deref().and_then(|name| self.backend(name))
    }
}

fn collect_gotos(
    subroutine: &str,
    statements: &[Statement],
    gotos: &mut HashMap<String, String>,
) -> InterpreterResult<()> {
    for statement in statements {
        match &statement.kind {
            StatementKind::GotoDestination { name } => {
                insert_unique(gotos, "goto destination", name, subroutine.to_string())?;
            }
            StatementKind::Block(inner) => collect_gotos(subroutine, inner, gotos)?,
            StatementKind::If(branch) => {
                collect_gotos(subroutine, &branch.consequence, gotos)?;
                for alternative in &branch.alternatives {
                    collect_gotos(subroutine, &alternative.consequence, gotos)?;
                }
                if let Some(alternative) = &branch.alternative {
                    collect_gotos(subroutine, alternative, gotos)?;
                }
            }
            StatementKind::Switch(switch) => {
                for case in &switch.cases {
                    collect_gotos(subroutine, &case.statements, gotos)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BackendDeclaration, DirectorDeclaration};

    #[test]
    fn indexes_backends_and_directors_together() {
        let program = Program::new(vec![
            Declaration::Backend(BackendDeclaration {
                name: "F_origin".into(),
                ..Default::default()
            }),
            Declaration::Director(DirectorDeclaration {
                name: "pool".into(),
                director_type: "random".into(),
                ..Default::default()
            }),
        ]);
        let declarations = Declarations::load(&program).unwrap();
        assert!(declarations.backend("F_origin").unwrap().as_director().is_none());
        assert!(declarations.backend("pool").unwrap().as_director().is_some());
        assert_eq!(declarations.default_backend().unwrap().name(), "F_origin");
    }

    #[test]
    fn registers_goto_labels_and_rejects_duplicates() {
        let body = vec![Statement::goto("done"), Statement::destination("done")];
        let program = Program::new(vec![Declaration::Subroutine(SubroutineDeclaration::new(
            "vcl_recv", body,
        ))]);
        let declarations = Declarations::load(&program).unwrap();
        assert_eq!(declarations.gotos.get("done").map(String::as_str), Some("vcl_recv"));

        let twice = Program::new(vec![Declaration::Subroutine(SubroutineDeclaration::new(
            "vcl_recv",
            vec![Statement::destination("x"), Statement::destination("x")],
        ))]);
        assert!(matches!(
            Declarations::load(&twice),
            Err(InterpreterError::Config(_))
        ));
    }
}
