use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::{FilterOp, FilterWhereInfo};
use super::validate_column;

/// Compiles a JSON where document into a SQL boolean expression with
/// positional parameters numbered after `starting_param_index`.
///
/// With a row type (a table name), each value is bound as a one-key JSONB
/// object and read back through `jsonb_populate_record`, so it takes the
/// type of the column it is compared with.
pub struct FilterWhere<'a> {
    param_values: Vec<Value>,
    param_index: usize,
    sql_conditions: Vec<String>,
    row_type: Option<&'a str>,
}

impl<'a> FilterWhere<'a> {
    pub fn new(starting_param_index: usize, row_type: Option<&'a str>) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
            sql_conditions: vec![],
            row_type,
        }
    }

    /// Returns `("1=1", [])` for an empty document.
    pub fn generate(where_data: &Value, starting_param_index: usize) -> Result<(String, Vec<Value>), FilterError> {
        FilterWhere::generate_typed(where_data, starting_param_index, None)
    }

    pub fn generate_typed(
        where_data: &Value,
        starting_param_index: usize,
        row_type: Option<&'a str>,
    ) -> Result<(String, Vec<Value>), FilterError> {
        let mut filter_where = Self::new(starting_param_index, row_type);
        filter_where.parse_where_data(where_data)?;
        let where_clause = if filter_where.sql_conditions.is_empty() {
            "1=1".to_string()
        } else {
            filter_where.sql_conditions.join(" AND ")
        };
        Ok((where_clause, filter_where.param_values))
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null | Value::Object(_) => Ok(()),
            Value::String(_) => Err(FilterError::InvalidWhereClause("raw SQL predicates are not accepted".to_string())),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn parse_where_data(&mut self, where_data: &Value) -> Result<(), FilterError> {
        Self::validate(where_data)?;
        if let Value::Object(obj) = where_data {
            for (key, value) in obj {
                if key.starts_with('$') {
                    self.parse_logical_operator(key, value)?;
                } else {
                    self.parse_field_condition(key, value)?;
                }
            }
        }
        Ok(())
    }

    fn parse_logical_operator(&mut self, op: &str, value: &Value) -> Result<(), FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                if arr.is_empty() {
                    return Err(FilterError::InvalidOperatorData(format!("{} requires at least one clause", op)));
                }
                let mut sql_parts = Vec::new();
                for v in arr {
                    let (sql, params) = Self::generate_typed(v, self.param_index, self.row_type)?;
                    self.param_index += params.len();
                    self.param_values.extend(params);
                    sql_parts.push(format!("({})", sql));
                }
                let joiner = if op == "$and" { " AND " } else { " OR " };
                self.sql_conditions.push(format!("({})", sql_parts.join(joiner)));
                Ok(())
            }
            "$not" => {
                let (sql, params) = Self::generate_typed(value, self.param_index, self.row_type)?;
                self.param_index += params.len();
                self.param_values.extend(params);
                self.sql_conditions.push(format!("NOT ({})", sql));
                Ok(())
            }
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn parse_field_condition(&mut self, field: &str, value: &Value) -> Result<(), FilterError> {
        validate_column(field)?;
        match value {
            Value::Object(obj) if obj.keys().all(|k| k.starts_with('$')) && !obj.is_empty() => {
                for (op_key, op_val) in obj {
                    let operator = Self::map_operator(op_key)?;
                    let condition = FilterWhereInfo { column: field.to_string(), operator, data: op_val.clone() };
                    let sql = self.build_sql_condition(&condition)?;
                    self.sql_conditions.push(sql);
                }
            }
            _ => {
                // Implicit equality: { field: value }
                let condition = FilterWhereInfo { column: field.to_string(), operator: FilterOp::Eq, data: value.clone() };
                let sql = self.build_sql_condition(&condition)?;
                self.sql_conditions.push(sql);
            }
        }
        Ok(())
    }

    pub fn map_operator(op_key: &str) -> Result<FilterOp, FilterError> {
        Ok(match op_key {
            "$eq" => FilterOp::Eq,
            "$ne" | "$neq" => FilterOp::Ne,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$like" => FilterOp::Like,
            "$ilike" => FilterOp::ILike,
            "$in" => FilterOp::In,
            "$nin" => FilterOp::NIn,
            "$between" => FilterOp::Between,
            "$null" => FilterOp::Null,
            other => return Err(FilterError::UnsupportedOperator(other.to_string())),
        })
    }

    fn build_sql_condition(&mut self, condition: &FilterWhereInfo) -> Result<String, FilterError> {
        let quoted_column = format!("\"{}\"", condition.column);
        let data = &condition.data;
        Ok(match condition.operator {
            FilterOp::Eq => {
                if data.is_null() { format!("{} IS NULL", quoted_column) }
                else { format!("{} = {}", quoted_column, self.param(&condition.column, data.clone())) }
            }
            FilterOp::Ne => {
                if data.is_null() { format!("{} IS NOT NULL", quoted_column) }
                else { format!("{} <> {}", quoted_column, self.param(&condition.column, data.clone())) }
            }
            FilterOp::Gt => format!("{} > {}", quoted_column, self.param(&condition.column, data.clone())),
            FilterOp::Gte => format!("{} >= {}", quoted_column, self.param(&condition.column, data.clone())),
            FilterOp::Lt => format!("{} < {}", quoted_column, self.param(&condition.column, data.clone())),
            FilterOp::Lte => format!("{} <= {}", quoted_column, self.param(&condition.column, data.clone())),
            FilterOp::Like => format!("{} LIKE {}", quoted_column, self.param(&condition.column, data.clone())),
            FilterOp::ILike => format!("{} ILIKE {}", quoted_column, self.param(&condition.column, data.clone())),
            FilterOp::In | FilterOp::NIn => {
                let negate = condition.operator == FilterOp::NIn;
                match data {
                    Value::Array(values) if values.is_empty() => {
                        if negate { "1=1".to_string() } else { "1=0".to_string() }
                    }
                    Value::Array(values) => {
                        let params: Vec<String> = values.iter().map(|v| self.param(&condition.column, v.clone())).collect();
                        let keyword = if negate { "NOT IN" } else { "IN" };
                        format!("{} {} ({})", quoted_column, keyword, params.join(", "))
                    }
                    other => {
                        let op = if negate { "<>" } else { "=" };
                        format!("{} {} {}", quoted_column, op, self.param(&condition.column, other.clone()))
                    }
                }
            }
            FilterOp::Between => match data {
                Value::Array(values) if values.len() == 2 => format!(
                    "{} BETWEEN {} AND {}",
                    quoted_column,
                    self.param(&condition.column, values[0].clone()),
                    self.param(&condition.column, values[1].clone())
                ),
                _ => return Err(FilterError::InvalidOperatorData("$between requires array with 2 values".to_string())),
            },
            FilterOp::Null => match data {
                Value::Bool(true) => format!("{} IS NULL", quoted_column),
                Value::Bool(false) => format!("{} IS NOT NULL", quoted_column),
                _ => return Err(FilterError::InvalidOperatorData("$null requires a boolean".to_string())),
            },
        })
    }

    fn param(&mut self, column: &str, value: Value) -> String {
        self.param_index += 1;
        match self.row_type {
            Some(table) => {
                let mut field = Map::new();
                field.insert(column.to_string(), value);
                self.param_values.push(Value::Object(field));
                format!("(jsonb_populate_record(NULL::\"{}\", ${})).\"{}\"", table, self.param_index, column)
            }
            None => {
                self.param_values.push(value);
                format!("${}", self.param_index)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_params_after_starting_index() {
        let (sql, params) = FilterWhere::generate(&json!({ "statut": "en_cours", "cout": { "$gte": 100 } }), 1).unwrap();
        assert_eq!(sql, "\"cout\" >= $2 AND \"statut\" = $3");
        assert_eq!(params, vec![json!(100), json!("en_cours")]);
    }

    #[test]
    fn nested_logical_operators_keep_numbering() {
        let where_data = json!({
            "$or": [ { "statut": "urgent" }, { "priorite": { "$in": [1, 2] } } ],
            "zone": "Paris"
        });
        let (sql, params) = FilterWhere::generate(&where_data, 1).unwrap();
        assert_eq!(sql, "((\"statut\" = $2) OR (\"priorite\" IN ($3, $4))) AND \"zone\" = $5");
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn typed_params_take_the_column_type() {
        let (sql, params) = FilterWhere::generate_typed(&json!({ "contact": "2024-01-01" }), 1, Some("clients")).unwrap();
        assert_eq!(sql, "\"contact\" = (jsonb_populate_record(NULL::\"clients\", $2)).\"contact\"");
        assert_eq!(params, vec![json!({ "contact": "2024-01-01" })]);

        let (sql, params) = FilterWhere::generate_typed(&json!({ "$or": [ { "id": { "$in": ["a", "b"] } } ] }), 1, Some("tasks")).unwrap();
        assert!(sql.contains("$3)).\"id\")"), "{}", sql);
        assert_eq!(params, vec![json!({ "id": "a" }), json!({ "id": "b" })]);
    }

    #[test]
    fn empty_document_is_true() {
        assert_eq!(FilterWhere::generate(&json!({}), 0).unwrap().0, "1=1");
        assert_eq!(FilterWhere::generate(&Value::Null, 0).unwrap().0, "1=1");
    }

    #[test]
    fn rejects_raw_sql_and_bad_columns() {
        assert!(FilterWhere::generate(&json!("1=1 OR tenant_id IS NOT NULL"), 0).is_err());
        assert!(FilterWhere::generate(&json!({ "nom\" OR 1=1 --": "x" }), 0).is_err());
        assert!(FilterWhere::generate(&json!({ "nom": { "$regex": ".*" } }), 0).is_err());
    }
}
