use std::collections::HashMap;

/// Binary operator precedences for one compilation unit.
///
/// The parser consults it for every operator token and extends it as soon as
/// a `binary` prototype is read; lowering keeps it in step with the functions
/// that actually get defined.
///
/// A declaration stays pending until it is committed or retracted. Retracting
/// restores whatever the symbol had before the first pending declaration, so a
/// definition that fails twice over (in the parser, then in lowering) still
/// finds the original value.
#[derive(Debug, Clone, PartialEq)]
pub struct PrecedenceTable {
    table: HashMap<char, i32>,
    pending: HashMap<char, Option<i32>>,
}

impl Default for PrecedenceTable {
    fn default() -> PrecedenceTable {
        let mut table = HashMap::new();
        table.insert('=', 2);
        table.insert('<', 10);
        table.insert('+', 20);
        table.insert('-', 20);
        table.insert('*', 40);
        PrecedenceTable {
            table,
            pending: HashMap::new(),
        }
    }
}

impl PrecedenceTable {
    pub fn new() -> PrecedenceTable {
        PrecedenceTable::default()
    }

    pub fn get(&self, op: char) -> Option<i32> {
        self.table.get(&op).cloned()
    }

    pub fn set(&mut self, op: char, precedence: i32) {
        self.table.insert(op, precedence);
    }

    pub fn remove(&mut self, op: char) -> Option<i32> {
        self.table.remove(&op)
    }

    pub fn contains(&self, op: char) -> bool {
        self.table.contains_key(&op)
    }

    pub fn declare(&mut self, op: char, precedence: i32) {
        let previous = self.get(op);
        self.pending.entry(op).or_insert(previous);
        self.set(op, precedence);
    }

    pub fn commit(&mut self, op: char) {
        self.pending.remove(&op);
    }

    pub fn retract(&mut self, op: char) {
        match self.pending.remove(&op) {
            Some(Some(previous)) => self.set(op, previous),
            Some(None) => {
                self.remove(op);
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_builtins() {
        let t = PrecedenceTable::new();
        assert_eq!(t.get('*'), Some(40));
        assert_eq!(t.get('+'), t.get('-'));
        assert_eq!(t.get('<'), Some(10));
        assert_eq!(t.get('='), Some(2));
        assert_eq!(t.get('|'), None);
        assert_eq!(t.get('/'), None);
    }

    #[test]
    fn test_set_remove() {
        let mut t = PrecedenceTable::new();
        t.set('|', 5);
        assert!(t.contains('|'));
        assert_eq!(t.remove('|'), Some(5));
        assert!(!t.contains('|'));
    }

    #[test]
    fn test_retract_restores() {
        let mut t = PrecedenceTable::new();
        t.declare('<', 5);
        t.declare('<', 5);
        assert_eq!(t.get('<'), Some(5));
        t.retract('<');
        assert_eq!(t.get('<'), Some(10));

        t.declare('|', 5);
        t.retract('|');
        assert_eq!(t.get('|'), None);
    }

    #[test]
    fn test_commit() {
        let mut t = PrecedenceTable::new();
        t.declare('|', 5);
        t.commit('|');
        t.declare('|', 50);
        t.retract('|');
        assert_eq!(t.get('|'), Some(5));

        // Nothing pending, nothing to undo.
        t.retract('|');
        assert_eq!(t.get('|'), Some(5));
    }
}
