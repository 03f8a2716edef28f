use std::collections::HashMap;

/// Where a resolved name lives at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolScope {
    /// Slot in the program-wide globals array.
    Global,
    /// Slot relative to the current frame's base pointer.
    Local,
    /// Entry in the fixed builtin table.
    Builtin,
    /// Entry in the running closure's captured values.
    Free,
    /// The function currently being defined (self reference).
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

impl Symbol {
    fn new(name: &str, scope: SymbolScope, index: usize) -> Self {
        Self {
            name: name.to_string(),
            scope,
            index,
        }
    }
}

/// Names visible in one function body (or the top level).
#[derive(Debug, Clone, Default)]
struct ScopeTable {
    store: HashMap<String, Symbol>,
    /// Captured symbols as resolved in the enclosing scope, in capture order.
    free_symbols: Vec<Symbol>,
    num_definitions: usize,
}

impl ScopeTable {
    fn define_free(&mut self, original: Symbol) -> Symbol {
        let symbol = Symbol::new(&original.name, SymbolScope::Free, self.free_symbols.len());
        self.free_symbols.push(original);
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }
}

/// What a function body leaves behind once its scope is closed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClosedScope {
    pub num_definitions: usize,
    pub free_symbols: Vec<Symbol>,
}

/// Stack of nested scopes. Index 0 is the global scope; the last entry is
/// the scope currently being compiled. A scope's outer scope is simply the
/// entry below it.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    scopes: Vec<ScopeTable>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![ScopeTable::default()],
        }
    }

    /// Number of enclosing function scopes (0 at top level).
    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    /// Open a nested scope for a function body.
    pub fn enter(&mut self) {
        self.scopes.push(ScopeTable::default());
    }

    /// Close the innermost function scope. The global scope is never popped.
    pub fn leave(&mut self) -> ClosedScope {
        if self.scopes.len() == 1 {
            return ClosedScope::default();
        }

        match self.scopes.pop() {
            Some(scope) => ClosedScope {
                num_definitions: scope.num_definitions,
                free_symbols: scope.free_symbols,
            },
            None => ClosedScope::default(),
        }
    }

    fn current(&mut self) -> &mut ScopeTable {
        let top = self.scopes.len() - 1;
        &mut self.scopes[top]
    }

    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.depth() == 0 {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };

        let table = self.current();
        let symbol = Symbol::new(name, scope, table.num_definitions);
        table.store.insert(name.to_string(), symbol.clone());
        table.num_definitions += 1;
        symbol
    }

    /// Builtins go into the global scope so every nested scope can see them.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol::new(name, SymbolScope::Builtin, index);
        self.scopes[0].store.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol::new(name, SymbolScope::Function, 0);
        self.current().store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Resolve `name` from the innermost scope outwards.
    ///
    /// A hit in an enclosing function scope is recorded as a free variable in
    /// every scope between it and the innermost one.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        let top = self.scopes.len() - 1;
        self.resolve_at(top, name)
    }

    fn resolve_at(&mut self, level: usize, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.scopes[level].store.get(name) {
            return Some(symbol.clone());
        }
        if level == 0 {
            return None;
        }

        let outer = self.resolve_at(level - 1, name)?;
        match outer.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(outer),
            SymbolScope::Local | SymbolScope::Free | SymbolScope::Function => {
                Some(self.scopes[level].define_free(outer))
            }
        }
    }

    /// Snapshot of the global scope, used to roll back a failed compilation.
    pub(crate) fn globals_snapshot(&self) -> SymbolTable {
        SymbolTable {
            scopes: vec![self.scopes[0].clone()],
        }
    }
}
