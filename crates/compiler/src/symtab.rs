//! Symbol table and scope manager.
//!
//! The table is a single flat name -> Symbol mapping: shadowing is not
//! supported. A local re-declaration using a parameter or global function
//! name is a redefinition error. Popping a scope restores exactly the table
//! state that existed when the scope was pushed (FIFO discipline).

use crate::ast::Type;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Function,
    Parameter,
    Variable,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: Kind,
    pub ty: Type,
    /// Parameter signature, present only for `Kind::Function` symbols.
    /// Cloned into the symbol at signature time rather than aliasing the
    /// defining AST node, so the symbol table has no lifetime tied to the AST.
    pub params: Option<Vec<(String, Type)>>,
}

impl Symbol {
    pub fn function(name: impl Into<String>, return_type: Type, params: Vec<(String, Type)>) -> Self {
        Symbol {
            name: name.into(),
            kind: Kind::Function,
            ty: return_type,
            params: Some(params),
        }
    }

    pub fn variable(name: impl Into<String>, ty: Type, kind: Kind) -> Self {
        Symbol {
            name: name.into(),
            kind,
            ty,
            params: None,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Inserts a symbol, rejecting a duplicate name already present.
    /// Returns whether the insertion succeeded.
    pub fn insert(&mut self, symbol: Symbol) -> bool {
        if self.symbols.contains_key(&symbol.name) {
            return false;
        }
        self.symbols.insert(symbol.name.clone(), symbol);
        true
    }

    pub fn lookup(&self, name: &str, kinds: &[Kind]) -> bool {
        self.symbols
            .get(name)
            .is_some_and(|sym| kinds.contains(&sym.kind))
    }

    /// Precondition: `lookup` has already succeeded for `name`.
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    fn remove(&mut self, name: &str) {
        self.symbols.remove(name);
    }

    /// Updates a present symbol's type in place. Used to resolve an `auto`
    /// declaration's placeholder type once its initializer has been checked.
    pub fn set_type(&mut self, name: &str, ty: Type) {
        if let Some(symbol) = self.symbols.get_mut(name) {
            symbol.ty = ty;
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Owns the stack of lexical scopes over a `SymbolTable`.
///
/// Each scope remembers the names it inserted so `pop_scope` can remove
/// exactly those entries, regardless of what happened inside the scope.
pub struct ScopeManager<'a> {
    table: &'a mut SymbolTable,
    scopes: Vec<Vec<String>>,
}

impl<'a> ScopeManager<'a> {
    pub fn new(table: &'a mut SymbolTable) -> Self {
        ScopeManager {
            table,
            scopes: Vec::new(),
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    pub fn pop_scope(&mut self) {
        if let Some(names) = self.scopes.pop() {
            for name in names {
                self.table.remove(&name);
            }
        }
    }

    /// Inserts a symbol into the current scope. Returns whether insertion
    /// succeeded (false on duplicate name anywhere in the flat table).
    pub fn insert(&mut self, symbol: Symbol) -> bool {
        let name = symbol.name.clone();
        if !self.table.insert(symbol) {
            return false;
        }
        if let Some(current) = self.scopes.last_mut() {
            current.push(name);
        }
        true
    }

    pub fn lookup(&self, name: &str, kinds: &[Kind]) -> bool {
        self.table.lookup(name, kinds)
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.table.get(name)
    }

    pub fn table(&self) -> &SymbolTable {
        self.table
    }

    pub fn set_type(&mut self, name: &str, ty: Type) {
        self.table.set_type(name, ty);
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_restores_state() {
        let mut table = SymbolTable::new();
        let mut scopes = ScopeManager::new(&mut table);
        scopes.push_scope();
        assert!(scopes.insert(Symbol::variable("x", Type::Int, Kind::Variable)));
        assert!(scopes.lookup("x", &[Kind::Variable]));
        scopes.pop_scope();
        assert!(!scopes.lookup("x", &[Kind::Variable]));
    }

    #[test]
    fn duplicate_insert_rejected() {
        let mut table = SymbolTable::new();
        let mut scopes = ScopeManager::new(&mut table);
        scopes.push_scope();
        assert!(scopes.insert(Symbol::variable("x", Type::Int, Kind::Variable)));
        assert!(!scopes.insert(Symbol::variable("x", Type::Unsigned, Kind::Variable)));
    }

    #[test]
    fn nested_scopes_pop_independently() {
        let mut table = SymbolTable::new();
        let mut scopes = ScopeManager::new(&mut table);
        scopes.push_scope();
        scopes.insert(Symbol::variable("outer", Type::Int, Kind::Variable));
        scopes.push_scope();
        scopes.insert(Symbol::variable("inner", Type::Int, Kind::Variable));
        scopes.pop_scope();
        assert!(!scopes.lookup("inner", &[Kind::Variable]));
        assert!(scopes.lookup("outer", &[Kind::Variable]));
        scopes.pop_scope();
        assert!(!scopes.lookup("outer", &[Kind::Variable]));
    }

    #[test]
    fn function_symbol_carries_params() {
        let mut table = SymbolTable::new();
        assert!(table.insert(Symbol::function(
            "add",
            Type::Int,
            vec![("a".to_string(), Type::Int), ("b".to_string(), Type::Int)]
        )));
        let sym = table.get("add").unwrap();
        assert_eq!(sym.params.as_ref().unwrap().len(), 2);
    }
}
