//! Scopes and variables: the output contract of the (out-of-scope)
//! variable/scope resolver, as consumed by codegen.
//!
//! Modeled as owned nodes in a pair of arenas rather than an intrusive tree
//! of reference-counted/parent-pointer nodes, so codegen can address a scope
//! or variable by a small integer id instead of juggling lifetimes. Lookup
//! by name goes through a `HashMap` per scope rather than the reference
//! implementation's red-black tree keyed by token identity.

use std::collections::HashMap;

use kos_bytecode::Reg;

/// Arena index for a [`Scope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

/// Arena index for a [`Variable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

/// How a variable is stored and reached at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// An ordinary local: lives in one register for its whole scope.
    Local,
    /// A declared positional parameter, passed in a register.
    ArgumentInRegister,
    /// A parameter promoted off the register file (e.g. past the point
    /// where a generator suspends across it).
    ArgumentOnHeap,
    /// A local captured by a nested closure; allocated at the bottom of the
    /// frame so `BIND_SELF` can expose it by a stable index.
    IndependentLocal,
    /// A parameter captured by a nested closure.
    IndependentArgument,
    /// A module-top-level binding, reached via `GET_GLOBAL`/`SET_GLOBAL`.
    Global,
    /// A binding belonging to another module, reached via `GET_MOD*`.
    Module,
    /// A name brought in by an import statement.
    Imported,
}

impl VariableKind {
    /// Independent variables need a register reserved ahead of ordinary
    /// locals/arguments so `BIND_SELF` can find them by slot.
    pub const fn is_independent(self) -> bool {
        matches!(self, VariableKind::IndependentLocal | VariableKind::IndependentArgument)
    }

    pub const fn is_argument(self) -> bool {
        matches!(
            self,
            VariableKind::ArgumentInRegister | VariableKind::ArgumentOnHeap | VariableKind::IndependentArgument
        )
    }
}

/// A named binding produced by the resolver.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub kind: VariableKind,
    pub is_const: bool,
    pub home_scope: ScopeId,
    pub num_reads: u32,
    pub num_assignments: u32,
    pub local_reads: u32,
    pub local_assignments: u32,
    /// Slot index into the variable's container: a register number for
    /// locals/arguments, or an index into the globals array / closure args
    /// array for the other kinds.
    pub array_idx: u32,
    /// Whether the name is currently in scope at the codegen cursor. Cleared
    /// when the owning scope is popped, so a later shadowing declaration of
    /// the same source name doesn't resolve to a dead variable.
    pub is_active: bool,
    /// The register this variable has been bound to, once codegen has
    /// allocated one (locals/arguments only).
    pub reg: Option<Reg>,
}

impl Variable {
    pub fn new(name: impl Into<String>, kind: VariableKind, home_scope: ScopeId) -> Self {
        Variable {
            name: name.into(),
            kind,
            is_const: false,
            home_scope,
            num_reads: 0,
            num_assignments: 0,
            local_reads: 0,
            local_assignments: 0,
            array_idx: 0,
            is_active: true,
            reg: None,
        }
    }
}

/// A lexical region: a function body, a block, a loop body, a catch clause, etc.
#[derive(Debug, Clone)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub is_function: bool,
    pub has_frame: bool,
    pub uses_this: bool,
    pub has_rest_param: bool,
    pub ellipsis_var: Option<VarId>,
    /// Variables declared directly in this scope, in declaration order.
    pub vars: Vec<VarId>,
    by_name: HashMap<String, VarId>,
    /// Count of locals in this scope (and its function, transitively) that
    /// are captured by a nested closure.
    pub num_independent_locals: u32,
    pub num_independent_args: u32,
}

impl Scope {
    pub fn new(parent: Option<ScopeId>, is_function: bool) -> Self {
        Scope {
            parent,
            is_function,
            has_frame: is_function,
            uses_this: false,
            has_rest_param: false,
            ellipsis_var: None,
            vars: Vec::new(),
            by_name: HashMap::new(),
            num_independent_locals: 0,
            num_independent_args: 0,
        }
    }

    pub fn declare(&mut self, id: VarId, name: &str) {
        self.vars.push(id);
        self.by_name.insert(name.to_string(), id);
    }

    pub fn lookup_local(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }
}

/// Owns every [`Scope`] and [`Variable`] produced for one module, and
/// answers the name-resolution queries codegen needs while walking the AST.
#[derive(Debug, Default)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
    vars: Vec<Variable>,
}

impl ScopeArena {
    pub fn new() -> Self {
        ScopeArena { scopes: Vec::new(), vars: Vec::new() }
    }

    pub fn new_scope(&mut self, parent: Option<ScopeId>, is_function: bool) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(parent, is_function));
        id
    }

    pub fn new_var(&mut self, home_scope: ScopeId, name: impl Into<String>, kind: VariableKind) -> VarId {
        let id = VarId(self.vars.len() as u32);
        let name = name.into();
        self.vars.push(Variable::new(name.clone(), kind, home_scope));
        self.scopes[home_scope.0 as usize].declare(id, &name);
        if kind.is_independent() {
            match kind {
                VariableKind::IndependentLocal => self.scopes[home_scope.0 as usize].num_independent_locals += 1,
                VariableKind::IndependentArgument => self.scopes[home_scope.0 as usize].num_independent_args += 1,
                _ => unreachable!(),
            }
        }
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id.0 as usize]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.vars[id.0 as usize]
    }

    /// Walk up from `scope` through its parents looking for an active
    /// binding named `name`. Returns the variable and the scope it was
    /// declared in, so the caller can tell a local reference from a
    /// closure-crossing one by comparing against the current function scope.
    pub fn resolve(&self, scope: ScopeId, name: &str) -> Option<VarId> {
        let mut cur = Some(scope);
        while let Some(s) = cur {
            if let Some(id) = self.scopes[s.0 as usize].lookup_local(name) {
                if self.vars[id.0 as usize].is_active {
                    return Some(id);
                }
            }
            cur = self.scopes[s.0 as usize].parent;
        }
        None
    }

    /// The nearest function scope at or above `scope` (the scope that owns
    /// the [`crate::frame::Frame`] a local register allocation belongs to).
    pub fn enclosing_function(&self, scope: ScopeId) -> ScopeId {
        let mut cur = scope;
        loop {
            if self.scopes[cur.0 as usize].is_function {
                return cur;
            }
            match self.scopes[cur.0 as usize].parent {
                Some(p) => cur = p,
                None => return cur,
            }
        }
    }

    /// Deactivate every variable declared directly in `scope`, called when
    /// codegen leaves a block so a later shadowing declaration resolves
    /// correctly and so registers can be freed.
    pub fn deactivate_scope(&mut self, scope: ScopeId) {
        let ids: Vec<VarId> = self.scopes[scope.0 as usize].vars.clone();
        for id in ids {
            self.vars[id.0 as usize].is_active = false;
        }
    }
}
