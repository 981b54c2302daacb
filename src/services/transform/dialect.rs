// SQL Dialect rendering
//
// The trait each dialect implements and the baseline renderer that walks logical plan
// nodes. Dialects override leaf renderings; the walk itself is shared.

use super::translator::{DialectId, TransformOptions};
use crate::error::{IngestError, Result};
use crate::logical_plan::{
    BinaryOperator, Condition, Copy, DigestColumn, FunctionName, InSource, Merge, Operation,
    Order, Selection, Source, Value, WindowFunction,
};
use crate::models::{
    Capabilities, Capability, DataType, Dataset, DatasetKind, DatasetReference, FieldType,
    StagedFilesDataset, StagedFilesProperties,
};

/// Leaf renderings that differ between warehouses
///
/// Every method has the baseline rendering as its default. A dialect must be able to
/// render every node a planner emits under its capability set.
pub trait SqlDialect: Send + Sync {
    fn id(&self) -> DialectId;

    fn capabilities(&self) -> Capabilities;

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(capability)
    }

    /// Identifier quote character
    fn quote(&self) -> char {
        '"'
    }

    fn data_type(&self, field_type: &FieldType) -> String {
        ansi_data_type(field_type)
    }

    fn batch_start_timestamp(&self, literal: &str) -> String {
        format!("'{}'", literal)
    }

    fn batch_end_timestamp(&self) -> String {
        "CURRENT_TIMESTAMP()".to_string()
    }

    fn function(&self, name: FunctionName, args: Vec<String>) -> String {
        format!("{}({})", name.as_str(), args.join(","))
    }

    fn cast(&self, value: String, field_type: &FieldType, safe: bool) -> Result<String> {
        if safe {
            return Err(IngestError::transform(format!(
                "{} has no safe cast",
                self.id().as_str()
            )));
        }
        Ok(format!("CAST({} AS {})", value, self.data_type(field_type)))
    }

    /// Positional column of a staged file
    fn staged_field(
        &self,
        r: &Renderer,
        dataset: Option<&str>,
        _index: usize,
        name: &str,
        _field_type: &FieldType,
    ) -> Result<String> {
        Ok(r.qualified(dataset, name))
    }

    fn metadata_file_name(&self, _r: &Renderer, _dataset: Option<&str>) -> Result<String> {
        Err(IngestError::transform(format!(
            "{} cannot read staged file names",
            self.id().as_str()
        )))
    }

    fn metadata_row_number(&self, _r: &Renderer, _dataset: Option<&str>) -> Result<String> {
        Err(IngestError::transform(format!(
            "{} cannot read staged file row numbers",
            self.id().as_str()
        )))
    }

    /// `udf(ARRAY['c1',...],ARRAY[v1,...])`
    fn digest_udf(&self, r: &Renderer, udf_name: &str, columns: &[DigestColumn]) -> Result<String> {
        let names: Vec<String> = columns.iter().map(|c| r.string_literal(&c.name)).collect();
        let values = columns
            .iter()
            .map(|c| r.value(&c.value))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!(
            "{}(ARRAY[{}],ARRAY[{}])",
            udf_name,
            names.join(","),
            values.join(",")
        ))
    }

    /// Staged files used as the FROM clause of a select
    fn staged_files_source(&self, _r: &Renderer, files: &StagedFilesDataset) -> Result<String> {
        Err(IngestError::transform(format!(
            "{} cannot select from staged files '{}'",
            self.id().as_str(),
            files.reference.name
        )))
    }

    fn create(&self, r: &Renderer, dataset: &Dataset, if_not_exists: bool) -> Result<String> {
        r.create_table(dataset, if_not_exists)
    }

    fn copy(&self, _r: &Renderer, copy: &Copy) -> Result<String> {
        Err(IngestError::transform(format!(
            "{} cannot load files into '{}'",
            self.id().as_str(),
            copy.target.name
        )))
    }

    /// Appended after the primary key clause of CREATE TABLE
    fn primary_key_suffix(&self) -> &'static str {
        ""
    }

    /// UPDATE and DELETE statements must carry a WHERE clause
    fn requires_where_clause(&self) -> bool {
        false
    }
}

pub(crate) fn ansi_data_type(field_type: &FieldType) -> String {
    let name = match field_type.data_type {
        DataType::Int => "INT",
        DataType::Integer => "INTEGER",
        DataType::BigInt => "BIGINT",
        DataType::SmallInt => "SMALLINT",
        DataType::TinyInt => "TINYINT",
        DataType::Float => "FLOAT",
        DataType::Double => "DOUBLE",
        DataType::Real => "REAL",
        DataType::Decimal => "DECIMAL",
        DataType::Numeric => "NUMERIC",
        DataType::Boolean => "BOOLEAN",
        DataType::Char => "CHAR",
        DataType::Varchar | DataType::String => "VARCHAR",
        DataType::Text => "TEXT",
        DataType::Date => "DATE",
        DataType::Time => "TIME",
        DataType::DateTime => "DATETIME",
        DataType::Timestamp => "TIMESTAMP",
        DataType::TimestampNtz => "TIMESTAMP_NTZ",
        DataType::TimestampTz => "TIMESTAMP_TZ",
        DataType::Binary => "BINARY",
        DataType::Variant => "VARIANT",
        DataType::Json => "JSON",
    };
    with_precision(name, field_type)
}

/// `NAME(length[,scale])` when a length is declared
pub(crate) fn with_precision(name: &str, field_type: &FieldType) -> String {
    match (field_type.length, field_type.scale) {
        (Some(length), Some(scale)) => format!("{}({},{})", name, length, scale),
        (Some(length), None) => format!("{}({})", name, length),
        _ => name.to_string(),
    }
}

/// Walks logical plan nodes, delegating leaves to the dialect.
pub struct Renderer<'a> {
    dialect: &'a dyn SqlDialect,
    options: &'a TransformOptions,
}

impl<'a> Renderer<'a> {
    pub fn new(dialect: &'a dyn SqlDialect, options: &'a TransformOptions) -> Self {
        Self { dialect, options }
    }

    pub fn options(&self) -> &TransformOptions {
        self.options
    }

    pub fn ident(&self, name: &str) -> String {
        let quote = self.dialect.quote();
        let name = self.options.case_conversion.apply(name);
        let escaped = name.replace(quote, &format!("{}{}", quote, quote));
        format!("{}{}{}", quote, escaped, quote)
    }

    /// Dataset alias, rendered as written and never quoted
    pub fn alias(&self, alias: &str) -> String {
        alias.to_string()
    }

    pub fn string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    pub fn qualified(&self, dataset: Option<&str>, name: &str) -> String {
        match dataset {
            Some(alias) => format!("{}.{}", self.alias(alias), self.ident(name)),
            None => self.ident(name),
        }
    }

    /// `"db"."group"."name"`, followed by ` as alias` when asked and present
    pub fn table(&self, reference: &DatasetReference, with_alias: bool) -> String {
        let parts: Vec<String> = [
            reference.database.as_deref(),
            reference.group.as_deref(),
            Some(reference.name.as_str()),
        ]
        .iter()
        .flatten()
        .map(|part| self.ident(part))
        .collect();
        let table = parts.join(".");
        match (&reference.alias, with_alias) {
            (Some(alias), true) => format!("{} as {}", table, self.alias(alias)),
            _ => table,
        }
    }

    pub fn values(&self, values: &[Value], separator: &str) -> Result<String> {
        Ok(values
            .iter()
            .map(|v| self.value(v))
            .collect::<Result<Vec<_>>>()?
            .join(separator))
    }

    pub fn value(&self, value: &Value) -> Result<String> {
        Ok(match value {
            Value::Field { dataset, name } => self.qualified(dataset.as_deref(), name),
            Value::All { dataset } => match dataset {
                Some(alias) => format!("{}.*", self.alias(alias)),
                None => "*".to_string(),
            },
            Value::String(s) => self.string_literal(s),
            Value::Number(n) => n.to_string(),
            Value::Null => "NULL".to_string(),
            Value::BatchStartTimestamp => self
                .dialect
                .batch_start_timestamp(&self.options.batch_start_literal()),
            Value::BatchEndTimestamp => self.dialect.batch_end_timestamp(),
            Value::BatchId(selection) => match &self.options.batch_id_pattern {
                Some(pattern) => pattern.clone(),
                None => format!("({})", self.selection(selection)?),
            },
            Value::Function { name, args } => {
                let args = args
                    .iter()
                    .map(|a| self.value(a))
                    .collect::<Result<Vec<_>>>()?;
                self.dialect.function(*name, args)
            }
            Value::Distinct(inner) => format!("DISTINCT {}", self.value(inner)?),
            Value::Cast {
                value,
                field_type,
                safe,
            } => self.dialect.cast(self.value(value)?, field_type, *safe)?,
            Value::Subquery(selection) => format!("({})", self.selection(selection)?),
            Value::Window(window) => self.window(window)?,
            Value::StagedFilesField {
                dataset,
                index,
                name,
                field_type,
            } => self
                .dialect
                .staged_field(self, dataset.as_deref(), *index, name, field_type)?,
            Value::MetadataFileName { dataset } => {
                self.dialect.metadata_file_name(self, dataset.as_deref())?
            }
            Value::MetadataRowNumber { dataset } => {
                self.dialect.metadata_row_number(self, dataset.as_deref())?
            }
            Value::DigestUdf { udf_name, columns } => {
                self.dialect.digest_udf(self, udf_name, columns)?
            }
            Value::Binary { op, left, right } => {
                let symbol = match op {
                    BinaryOperator::Add => "+",
                    BinaryOperator::Subtract => "-",
                };
                format!("{}{}{}", self.value(left)?, symbol, self.value(right)?)
            }
            Value::Aliased { value, alias } => {
                format!("{} as {}", self.value(value)?, self.ident(alias))
            }
        })
    }

    fn window(&self, window: &WindowFunction) -> Result<String> {
        let mut over = Vec::new();
        if !window.partition_by.is_empty() {
            over.push(format!("PARTITION BY {}", self.values(&window.partition_by, ",")?));
        }
        if !window.order_by.is_empty() {
            let order = window
                .order_by
                .iter()
                .map(|(value, order)| {
                    let direction = match order {
                        Order::Asc => "ASC",
                        Order::Desc => "DESC",
                    };
                    Ok(format!("{} {}", self.value(value)?, direction))
                })
                .collect::<Result<Vec<_>>>()?;
            over.push(format!("ORDER BY {}", order.join(",")));
        }
        Ok(format!(
            "{} OVER ({})",
            self.dialect.function(window.function, Vec::new()),
            over.join(" ")
        ))
    }

    pub fn condition(&self, condition: &Condition) -> Result<String> {
        let binary = |l: &Value, op: &str, r: &Value| -> Result<String> {
            Ok(format!("{} {} {}", self.value(l)?, op, self.value(r)?))
        };
        Ok(match condition {
            Condition::And(parts) => self.junction(parts, " AND ")?,
            Condition::Or(parts) => self.junction(parts, " OR ")?,
            Condition::Not(inner) => format!("NOT ({})", self.condition(inner)?),
            Condition::Equals(l, r) => binary(l, "=", r)?,
            Condition::NotEquals(l, r) => binary(l, "<>", r)?,
            Condition::GreaterThan(l, r) => binary(l, ">", r)?,
            Condition::GreaterThanEqualTo(l, r) => binary(l, ">=", r)?,
            Condition::LessThan(l, r) => binary(l, "<", r)?,
            Condition::LessThanEqualTo(l, r) => binary(l, "<=", r)?,
            Condition::IsNull(value) => format!("{} IS NULL", self.value(value)?),
            Condition::Exists(selection) => format!("EXISTS ({})", self.selection(selection)?),
            Condition::In(value, InSource::Values(values)) => {
                format!("{} IN ({})", self.value(value)?, self.values(values, ",")?)
            }
            Condition::In(value, InSource::Subquery(selection)) => {
                format!("{} IN ({})", self.value(value)?, self.selection(selection)?)
            }
        })
    }

    fn junction(&self, parts: &[Condition], separator: &str) -> Result<String> {
        Ok(parts
            .iter()
            .map(|c| Ok(format!("({})", self.condition(c)?)))
            .collect::<Result<Vec<_>>>()?
            .join(separator))
    }

    pub fn source(&self, source: &Source) -> Result<String> {
        match source {
            Source::Dataset(reference) => Ok(self.table(reference, true)),
            Source::Subquery(selection, alias) => {
                Ok(format!("({}) as {}", self.selection(selection)?, self.alias(alias)))
            }
            Source::StagedFiles(files) => self.dialect.staged_files_source(self, files),
        }
    }

    pub fn selection(&self, selection: &Selection) -> Result<String> {
        let mut sql = format!("SELECT {}", self.values(&selection.fields, ",")?);
        if let Some(source) = &selection.source {
            sql.push_str(&format!(" FROM {}", self.source(source)?));
        }
        if let Some(condition) = &selection.condition {
            sql.push_str(&format!(" WHERE {}", self.condition(condition)?));
        }
        if !selection.group_by.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", self.values(&selection.group_by, ",")?));
        }
        if let Some(having) = &selection.having {
            sql.push_str(&format!(" HAVING {}", self.condition(having)?));
        }
        if let Some(limit) = selection.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        Ok(sql)
    }

    fn assignments(&self, assignments: &[(Value, Value)]) -> Result<String> {
        Ok(assignments
            .iter()
            .map(|(field, value)| Ok(format!("{} = {}", self.value(field)?, self.value(value)?)))
            .collect::<Result<Vec<_>>>()?
            .join(", "))
    }

    pub fn operation(&self, operation: &Operation) -> Result<String> {
        match operation {
            Operation::Create {
                dataset,
                if_not_exists,
            } => self.dialect.create(self, dataset, *if_not_exists),
            Operation::Drop { dataset, if_exists } => Ok(format!(
                "DROP TABLE {}{}",
                if *if_exists { "IF EXISTS " } else { "" },
                self.table(dataset, false)
            )),
            Operation::Delete { dataset, condition } => {
                let mut sql = format!("DELETE FROM {}", self.table(dataset, true));
                match condition {
                    Some(c) => sql.push_str(&format!(" WHERE {}", self.condition(c)?)),
                    None if self.dialect.requires_where_clause() => sql.push_str(" WHERE 1 = 1"),
                    None => {}
                }
                Ok(sql)
            }
            Operation::Insert {
                target,
                fields,
                source,
            } => Ok(format!(
                "INSERT INTO {} ({}) ({})",
                self.table(target, false),
                self.values(fields, ", ")?,
                self.selection(source)?
            )),
            Operation::Update {
                target,
                assignments,
                condition,
            } => {
                let mut sql = format!(
                    "UPDATE {} SET {}",
                    self.table(target, true),
                    self.assignments(assignments)?
                );
                match condition {
                    Some(c) => sql.push_str(&format!(" WHERE {}", self.condition(c)?)),
                    None if self.dialect.requires_where_clause() => sql.push_str(" WHERE 1 = 1"),
                    None => {}
                }
                Ok(sql)
            }
            Operation::Merge(merge) => self.merge(merge),
            Operation::Copy(copy) => self.dialect.copy(self, copy),
            Operation::Select(selection) => self.selection(selection),
        }
    }

    fn merge(&self, merge: &Merge) -> Result<String> {
        if !self.dialect.supports(Capability::Merge) {
            return Err(IngestError::transform(format!(
                "{} does not support MERGE",
                self.dialect.id().as_str()
            )));
        }
        let mut sql = format!(
            "MERGE INTO {} USING {} ON {}",
            self.table(&merge.target, true),
            self.source(&merge.source)?,
            self.condition(&merge.on)?
        );
        if let Some(delete) = &merge.matched_delete {
            sql.push_str(&format!(" WHEN MATCHED AND {} THEN DELETE", self.condition(delete)?));
        }
        if let Some((changed, assignments)) = &merge.matched_update {
            sql.push_str(&format!(
                " WHEN MATCHED AND {} THEN UPDATE SET {}",
                self.condition(changed)?,
                self.assignments(assignments)?
            ));
        }
        if let Some(insert) = &merge.not_matched_insert {
            sql.push_str(" WHEN NOT MATCHED");
            if let Some(condition) = &insert.condition {
                sql.push_str(&format!(" AND {}", self.condition(condition)?));
            }
            sql.push_str(&format!(
                " THEN INSERT ({}) VALUES ({})",
                self.values(&insert.fields, ", ")?,
                self.values(&insert.values, ",")?
            ));
        }
        Ok(sql)
    }

    /// Column definitions plus the primary key clause
    pub fn column_definitions(&self, dataset: &Dataset) -> Vec<String> {
        let mut columns: Vec<String> = dataset
            .schema
            .fields()
            .iter()
            .map(|f| {
                let mut column = format!("{} {}", self.ident(&f.name), self.dialect.data_type(&f.field_type));
                if !f.nullable {
                    column.push_str(" NOT NULL");
                }
                column
            })
            .collect();
        let keys = dataset.schema.primary_keys();
        if !keys.is_empty() {
            let keys: Vec<String> = keys.iter().map(|k| self.ident(k)).collect();
            columns.push(format!(
                "PRIMARY KEY ({}){}",
                keys.join(", "),
                self.dialect.primary_key_suffix()
            ));
        }
        columns
    }

    /// Baseline CREATE for tables and file-backed external tables
    pub fn create_table(&self, dataset: &Dataset, if_not_exists: bool) -> Result<String> {
        let guard = if if_not_exists { "IF NOT EXISTS " } else { "" };
        let table = self.table(&dataset.reference, false);
        let columns = self.column_definitions(dataset).join(",");
        match &dataset.kind {
            DatasetKind::Table => Ok(format!("CREATE TABLE {}{}({})", guard, table, columns)),
            DatasetKind::External(properties) => Ok(format!(
                "CREATE EXTERNAL TABLE {}{}({}) WITH ({})",
                guard,
                table,
                columns,
                self.external_options(properties).join(", ")
            )),
        }
    }

    fn external_options(&self, properties: &StagedFilesProperties) -> Vec<String> {
        let mut options = vec![format!(
            "FORMAT = {}",
            self.string_literal(properties.format.type_name())
        )];
        if let Some(location) = &properties.location {
            options.push(format!("LOCATION = {}", self.string_literal(location)));
        }
        if !properties.file_paths.is_empty() {
            options.push(format!("FILES = ({})", self.string_list(&properties.file_paths)));
        }
        if !properties.file_patterns.is_empty() {
            options.push(format!("PATTERN = {}", self.string_literal(&pattern_regex(&properties.file_patterns))));
        }
        options
    }

    /// `'a', 'b'`
    pub fn string_list(&self, values: &[String]) -> String {
        values
            .iter()
            .map(|v| self.string_literal(v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Several patterns collapse into one alternation.
pub(crate) fn pattern_regex(patterns: &[String]) -> String {
    match patterns {
        [single] => single.clone(),
        _ => patterns
            .iter()
            .map(|p| format!("({})", p))
            .collect::<Vec<_>>()
            .join("|"),
    }
}
