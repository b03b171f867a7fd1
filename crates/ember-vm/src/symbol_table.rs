use ember_core::{intern, Spur};
use hashbrown::HashMap;

/// Where a resolved name lives, which decides the load/store opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Local,
    Builtin,
    Free,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub name: Spur,
    pub scope: Scope,
    pub index: usize,
}

/// Lexically scoped name resolution. Tables form an owned chain: entering
/// a function wraps the current table, leaving unwraps it.
///
/// Resolving a name defined in an enclosing function promotes it to a
/// Free symbol in this table (and, transitively, in every intermediate
/// table), recording the *original* symbol in `free_symbols`; the
/// compiler emits one load per entry when it builds the closure.
#[derive(Debug, Default)]
pub struct SymbolTable {
    pub outer: Option<Box<SymbolTable>>,
    store: HashMap<Spur, Symbol>,
    pub num_definitions: usize,
    pub free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn enclosed(outer: SymbolTable) -> Self {
        SymbolTable {
            outer: Some(Box::new(outer)),
            ..SymbolTable::default()
        }
    }

    pub fn define(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: intern(name),
            scope: if self.outer.is_none() {
                Scope::Global
            } else {
                Scope::Local
            },
            index: self.num_definitions,
        };
        self.store.insert(symbol.name, symbol);
        self.num_definitions += 1;
        symbol
    }

    /// Inject a builtin at a caller-supplied index so numbering stays
    /// aligned with the VM's registry.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: intern(name),
            scope: Scope::Builtin,
            index,
        };
        self.store.insert(symbol.name, symbol);
        symbol
    }

    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        self.resolve_spur(intern(name))
    }

    fn resolve_spur(&mut self, name: Spur) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(&name) {
            return Some(*symbol);
        }
        let outer = self.outer.as_mut()?;
        let symbol = outer.resolve_spur(name)?;
        if matches!(symbol.scope, Scope::Global | Scope::Builtin) {
            return Some(symbol);
        }
        Some(self.define_free(symbol))
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        self.free_symbols.push(original);
        let symbol = Symbol {
            name: original.name,
            scope: Scope::Free,
            index: self.free_symbols.len() - 1,
        };
        self.store.insert(symbol.name, symbol);
        symbol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str, scope: Scope, index: usize) -> Symbol {
        Symbol {
            name: intern(name),
            scope,
            index,
        }
    }

    #[test]
    fn test_define() {
        let mut global = SymbolTable::new();
        assert_eq!(global.define("a"), sym("a", Scope::Global, 0));
        assert_eq!(global.define("b"), sym("b", Scope::Global, 1));

        let mut first = SymbolTable::enclosed(global);
        assert_eq!(first.define("c"), sym("c", Scope::Local, 0));
        assert_eq!(first.define("d"), sym("d", Scope::Local, 1));

        let mut second = SymbolTable::enclosed(first);
        assert_eq!(second.define("e"), sym("e", Scope::Local, 0));
        assert_eq!(second.define("f"), sym("f", Scope::Local, 1));
    }

    #[test]
    fn test_resolve_global() {
        let mut global = SymbolTable::new();
        global.define("a");
        global.define("b");
        assert_eq!(global.resolve("a"), Some(sym("a", Scope::Global, 0)));
        assert_eq!(global.resolve("b"), Some(sym("b", Scope::Global, 1)));
        assert_eq!(global.resolve("c"), None);
    }

    #[test]
    fn test_resolve_local_shadows_global() {
        let mut global = SymbolTable::new();
        global.define("a");
        let mut local = SymbolTable::enclosed(global);
        local.define("a");
        assert_eq!(local.resolve("a"), Some(sym("a", Scope::Local, 0)));
    }

    #[test]
    fn test_distinct_functions_reuse_local_indices() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut first = SymbolTable::enclosed(global);
        first.define("c");
        assert_eq!(first.resolve("c"), Some(sym("c", Scope::Local, 0)));

        // A sibling function starts numbering locals at zero again.
        let outer = *first.outer.take().unwrap();
        let mut second = SymbolTable::enclosed(outer);
        second.define("e");
        assert_eq!(second.resolve("e"), Some(sym("e", Scope::Local, 0)));
        assert_eq!(second.resolve("a"), Some(sym("a", Scope::Global, 0)));
    }

    #[test]
    fn test_resolve_free() {
        let mut global = SymbolTable::new();
        global.define("a");
        global.define("b");

        let mut first = SymbolTable::enclosed(global);
        first.define("c");
        first.define("d");

        let mut second = SymbolTable::enclosed(first);
        second.define("e");
        second.define("f");

        assert_eq!(second.resolve("a"), Some(sym("a", Scope::Global, 0)));
        assert_eq!(second.resolve("b"), Some(sym("b", Scope::Global, 1)));
        assert_eq!(second.resolve("c"), Some(sym("c", Scope::Free, 0)));
        assert_eq!(second.resolve("d"), Some(sym("d", Scope::Free, 1)));
        assert_eq!(second.resolve("e"), Some(sym("e", Scope::Local, 0)));
        assert_eq!(second.resolve("f"), Some(sym("f", Scope::Local, 1)));

        // The free list records the originals, with their outer scope.
        assert_eq!(
            second.free_symbols,
            vec![sym("c", Scope::Local, 0), sym("d", Scope::Local, 1)]
        );
    }

    #[test]
    fn test_resolve_promotes_through_every_intermediate_table() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut outer_fn = SymbolTable::enclosed(global);
        outer_fn.define("b");

        let mut middle_fn = SymbolTable::enclosed(outer_fn);
        middle_fn.define("c");

        let mut inner_fn = SymbolTable::enclosed(middle_fn);
        inner_fn.define("d");

        // Resolving b from the innermost table promotes it in the middle
        // table too, so each intervening closure captures it.
        assert_eq!(inner_fn.resolve("b"), Some(sym("b", Scope::Free, 0)));
        let middle = inner_fn.outer.as_ref().unwrap();
        assert_eq!(middle.free_symbols, vec![sym("b", Scope::Local, 0)]);
        // The inner table's free list records the middle table's Free
        // symbol as the original.
        assert_eq!(inner_fn.free_symbols, vec![sym("b", Scope::Free, 0)]);
    }

    #[test]
    fn test_resolve_free_is_idempotent() {
        let mut global = SymbolTable::new();
        global.define("a");
        let mut outer_fn = SymbolTable::enclosed(global);
        outer_fn.define("x");
        let mut inner_fn = SymbolTable::enclosed(outer_fn);

        let first = inner_fn.resolve("x");
        let second = inner_fn.resolve("x");
        assert_eq!(first, second);
        assert_eq!(inner_fn.free_symbols.len(), 1);
    }

    #[test]
    fn test_define_builtin_resolves_at_every_depth() {
        let mut global = SymbolTable::new();
        global.define_builtin(0, "len");
        global.define_builtin(1, "puts");

        let mut first = SymbolTable::enclosed(global);
        let mut second = SymbolTable::enclosed(std::mem::take(&mut first));
        // Builtins pass through unchanged, never becoming free.
        assert_eq!(second.resolve("len"), Some(sym("len", Scope::Builtin, 0)));
        assert_eq!(second.resolve("puts"), Some(sym("puts", Scope::Builtin, 1)));
        assert!(second.free_symbols.is_empty());
    }

    #[test]
    fn test_unresolvable_free() {
        let mut global = SymbolTable::new();
        global.define("a");
        let mut inner = SymbolTable::enclosed(global);
        inner.define("c");
        assert_eq!(inner.resolve("a"), Some(sym("a", Scope::Global, 0)));
        assert_eq!(inner.resolve("missing"), None);
        assert!(inner.free_symbols.is_empty());
    }
}
