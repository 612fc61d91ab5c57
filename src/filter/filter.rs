use serde_json::Value;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{FilterData, FilterOrderInfo};
use super::validate_column;

/// Upper bound applied to any requested page size.
pub const MAX_LIMIT: i32 = 1000;

#[derive(Debug, Default)]
pub struct Filter {
    select_columns: Vec<String>,
    where_data: Option<Value>,
    order_data: Vec<FilterOrderInfo>,
    limit: Option<i32>,
    offset: Option<i32>,
}

/// SQL fragments of a filter, ready to be spliced into a statement.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    pub select: String,
    pub where_clause: String,
    pub order: String,
    pub limit: String,
    pub params: Vec<Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: FilterData) -> Result<Self, FilterError> {
        let mut filter = Self::new();
        filter.assign(data)?;
        Ok(filter)
    }

    pub fn assign(&mut self, data: FilterData) -> Result<&mut Self, FilterError> {
        if let Some(select) = data.select { self.select(select)?; }
        if let Some(where_clause) = data.where_clause { self.where_clause(where_clause)?; }
        if let Some(order) = data.order { self.order(order)?; }
        if let Some(limit) = data.limit { self.limit(limit, data.offset)?; }
        else if let Some(offset) = data.offset { self.offset(offset)?; }
        Ok(self)
    }

    pub fn select(&mut self, columns: Vec<String>) -> Result<&mut Self, FilterError> {
        for column in &columns {
            if column != "*" {
                validate_column(column)?;
            }
        }
        self.select_columns = columns;
        Ok(self)
    }

    pub fn where_clause(&mut self, conditions: Value) -> Result<&mut Self, FilterError> {
        FilterWhere::validate(&conditions)?;
        self.where_data = Some(conditions);
        Ok(self)
    }

    pub fn where_data(&self) -> Option<&Value> {
        self.where_data.as_ref()
    }

    pub fn take_where(&mut self) -> Option<Value> {
        self.where_data.take()
    }

    pub fn order(&mut self, order_spec: Value) -> Result<&mut Self, FilterError> {
        self.order_data = FilterOrder::validate_and_parse(&order_spec)?;
        Ok(self)
    }

    pub fn limit(&mut self, limit: i32, offset: Option<i32>) -> Result<&mut Self, FilterError> {
        if limit < 0 { return Err(FilterError::InvalidLimit("Limit must be non-negative".to_string())); }
        if limit > MAX_LIMIT {
            tracing::debug!("Limit {} exceeds max {}, capping to max", limit, MAX_LIMIT);
        }
        self.limit = Some(limit.min(MAX_LIMIT));
        if let Some(off) = offset {
            self.offset(off)?;
        }
        Ok(self)
    }

    pub fn offset(&mut self, offset: i32) -> Result<&mut Self, FilterError> {
        if offset < 0 { return Err(FilterError::InvalidOffset("Offset must be non-negative".to_string())); }
        self.offset = Some(offset);
        Ok(self)
    }

    /// Compile with positional parameters numbered after `starting_param_index`.
    pub fn compile(&self, starting_param_index: usize) -> Result<CompiledFilter, FilterError> {
        self.compile_with(starting_param_index, None)
    }

    /// Like `compile`, with every where value coerced to the type of its
    /// column in `table`.
    pub fn compile_for(&self, table: &str, starting_param_index: usize) -> Result<CompiledFilter, FilterError> {
        self.compile_with(starting_param_index, Some(table))
    }

    fn compile_with(&self, starting_param_index: usize, row_type: Option<&str>) -> Result<CompiledFilter, FilterError> {
        let (where_clause, params) = match self.where_data {
            Some(ref where_data) => FilterWhere::generate_typed(where_data, starting_param_index, row_type)?,
            None => ("1=1".to_string(), vec![]),
        };

        Ok(CompiledFilter {
            select: self.build_select_clause(),
            where_clause,
            order: FilterOrder::generate(&self.order_data),
            limit: self.build_limit_clause(),
            params,
        })
    }

    fn build_select_clause(&self) -> String {
        if self.select_columns.is_empty() || self.select_columns.iter().any(|c| c == "*") {
            "*".to_string()
        } else {
            self.select_columns.iter().map(|c| format!("\"{}\"", c)).collect::<Vec<_>>().join(", ")
        }
    }

    fn build_limit_clause(&self) -> String {
        match (self.limit, self.offset) {
            (Some(l), Some(o)) => format!("LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!("LIMIT {}", l),
            (None, Some(o)) => format!("OFFSET {}", o),
            (None, None) => String::new(),
        }
    }
}
