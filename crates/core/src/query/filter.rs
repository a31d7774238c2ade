// Typed predicates, sort keys and set-based assignments built from schema fields

use crate::domain::{FieldDef, Value};

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

/// Predicate tree over entity fields
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare {
        field: &'static str,
        op: CompareOp,
        value: Value,
    },
    In {
        field: &'static str,
        values: Vec<Value>,
    },
    IsNull(&'static str),
    IsNotNull(&'static str),
    Like {
        field: &'static str,
        pattern: String,
    },
    /// Empty conjunction is always true
    And(Vec<Filter>),
    /// Empty disjunction is always false
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// Matches every row
    pub fn all() -> Filter {
        Filter::And(Vec::new())
    }

    pub fn and(self, other: Filter) -> Filter {
        match (self, other) {
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), other) => {
                left.push(other);
                Filter::And(left)
            }
            (first, Filter::And(mut right)) => {
                right.insert(0, first);
                Filter::And(right)
            }
            (first, second) => Filter::And(vec![first, second]),
        }
    }

    pub fn or(self, other: Filter) -> Filter {
        match self {
            Filter::Or(mut left) => {
                left.push(other);
                Filter::Or(left)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Filter {
        Filter::Not(Box::new(self))
    }

    /// True when the filter places no restriction
    pub fn is_trivial(&self) -> bool {
        matches!(self, Filter::And(parts) if parts.iter().all(Filter::is_trivial))
    }

    /// Names of every field referenced by the filter
    pub fn fields(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        self.collect_fields(&mut names);
        names
    }

    fn collect_fields(&self, names: &mut Vec<&'static str>) {
        match self {
            Filter::Compare { field, .. }
            | Filter::In { field, .. }
            | Filter::Like { field, .. }
            | Filter::IsNull(field)
            | Filter::IsNotNull(field) => {
                if !names.contains(field) {
                    names.push(*field);
                }
            }
            Filter::And(parts) | Filter::Or(parts) => {
                for part in parts {
                    part.collect_fields(names);
                }
            }
            Filter::Not(inner) => inner.collect_fields(names),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One ordering key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: &'static str,
    pub direction: Direction,
}

/// `field = value` for set-based updates
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub field: &'static str,
    pub value: Value,
}

impl FieldDef {
    fn compare(&self, op: CompareOp, value: impl Into<Value>) -> Filter {
        Filter::Compare {
            field: self.name,
            op,
            value: value.into(),
        }
    }

    pub fn eq(&self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Eq, value)
    }

    pub fn ne(&self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Ne, value)
    }

    pub fn gt(&self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Gt, value)
    }

    pub fn ge(&self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Ge, value)
    }

    pub fn lt(&self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Lt, value)
    }

    pub fn le(&self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Le, value)
    }

    pub fn is_in<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Filter {
        Filter::In {
            field: self.name,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(&self) -> Filter {
        Filter::IsNull(self.name)
    }

    pub fn is_not_null(&self) -> Filter {
        Filter::IsNotNull(self.name)
    }

    /// SQL `LIKE` pattern match (`%` and `_` wildcards)
    pub fn like(&self, pattern: impl Into<String>) -> Filter {
        Filter::Like {
            field: self.name,
            pattern: pattern.into(),
        }
    }

    pub fn asc(&self) -> SortKey {
        SortKey {
            field: self.name,
            direction: Direction::Asc,
        }
    }

    pub fn desc(&self) -> SortKey {
        SortKey {
            field: self.name,
            direction: Direction::Desc,
        }
    }

    pub fn set(&self, value: impl Into<Value>) -> Assignment {
        Assignment {
            field: self.name,
            value: value.into(),
        }
    }
}
