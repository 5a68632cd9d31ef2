// ==========================================
// 交易数仓分层引擎 - 文件数据源
// ==========================================
// 约定: 数据源 <name> 对应目录下 <name>.csv 或 <name>.xlsx（CSV 优先）
// 支持: CSV (csv crate) / Excel 首个工作表 (calamine)
// 说明: 完全空白的行跳过；CSV 纯十进制文本与 Excel 数值单元格均转为 JSON 数值
// ==========================================

use crate::domain::record::Record;
use crate::source::error::{SourceError, SourceResult};
use crate::source::{matches_filters, Filters, SourceExtractor};
use async_trait::async_trait;
use calamine::{open_workbook, Data, Reader, Xlsx};
use csv::ReaderBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

// 前导零的编码（如 "007"）保持文本
static DECIMAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?(0|[1-9][0-9]*)(\.[0-9]+)?$").expect("decimal regex is valid")
});

#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 定位数据源文件
    fn locate(&self, source: &str) -> Option<PathBuf> {
        ["csv", "xlsx"]
            .iter()
            .map(|ext| self.root.join(format!("{}.{}", source, ext)))
            .find(|path| path.is_file())
    }
}

#[async_trait]
impl SourceExtractor for FileSource {
    async fn extract(&self, source: &str, filters: &Filters) -> SourceResult<Vec<Record>> {
        let Some(path) = self.locate(source) else {
            debug!(source = %source, root = %self.root.display(), "数据源文件不存在");
            return Ok(Vec::new());
        };

        let task_path = path.clone();
        let rows = tokio::task::spawn_blocking(move || read_rows(&task_path))
            .await
            .map_err(|e| SourceError::Task {
                source_name: source.to_string(),
                message: e.to_string(),
            })??;

        debug!(
            source = %source,
            file = %path.display(),
            rows = rows.len(),
            "数据源文件读取完成"
        );

        Ok(rows
            .into_iter()
            .filter(|row| matches_filters(row, filters))
            .collect())
    }
}

/// 按扩展名选择解析器
pub fn read_rows(path: &Path) -> SourceResult<Vec<Record>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "csv" => read_csv(path),
        "xlsx" => read_xlsx(path),
        _ => Err(SourceError::UnsupportedFormat(ext)),
    }
}

// ==========================================
// CSV
// ==========================================
fn read_csv(path: &Path) -> SourceResult<Vec<Record>> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true) // 允许行长度不一致
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let line = result?;
        let mut row = Record::new();
        for (idx, cell) in line.iter().enumerate() {
            if let Some(header) = headers.get(idx) {
                row.insert(header.clone(), csv_value(cell));
            }
        }

        // 跳过完全空白的行
        if row.values().all(Value::is_null) {
            continue;
        }
        rows.push(row);
    }
    Ok(rows)
}

// ==========================================
// Excel
// ==========================================
fn read_xlsx(path: &Path) -> SourceResult<Vec<Record>> {
    let mut workbook: Xlsx<_> =
        open_workbook(path).map_err(|e: calamine::XlsxError| SourceError::ExcelParse(e.to_string()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| SourceError::ExcelParse("Excel 文件无工作表".to_string()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| SourceError::ExcelParse(e.to_string()))?;

    let mut lines = range.rows();
    let Some(header_line) = lines.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header_line
        .iter()
        .map(|cell| cell.to_string().trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for line in lines {
        let mut row = Record::new();
        for (idx, cell) in line.iter().enumerate() {
            if let Some(header) = headers.get(idx) {
                row.insert(header.clone(), cell_value(cell));
            }
        }
        if row.values().all(Value::is_null) {
            continue;
        }
        rows.push(row);
    }
    Ok(rows)
}

/// CSV 单元格 -> JSON 值
fn csv_value(cell: &str) -> Value {
    let cell = cell.trim();
    if cell.is_empty() {
        return Value::Null;
    }
    if DECIMAL_RE.is_match(cell) {
        if let Ok(i) = cell.parse::<i64>() {
            return Value::from(i);
        }
        if let Some(n) = cell.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::from(cell)
}

/// Excel 单元格 -> JSON 值
fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) if s.trim().is_empty() => Value::Null,
        Data::String(s) => Value::from(s.trim()),
        other => Value::from(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_csv_source_with_filters() {
        let dir = TempDir::new().unwrap();
        let mut file = File::create(dir.path().join("orders.csv")).unwrap();
        writeln!(file, "order_id,status,quantity").unwrap();
        writeln!(file, "O1,completed,2").unwrap();
        writeln!(file, ",,").unwrap();
        writeln!(file, "O2,cancelled,1").unwrap();

        let source = FileSource::new(dir.path());
        let all = source.extract("orders", &Filters::new()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0]["quantity"], json!(2));

        let mut filters = Filters::new();
        filters.insert("status".to_string(), "cancelled".to_string());
        let filtered = source.extract("orders", &filters).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0]["order_id"], json!("O2"));
    }

    #[tokio::test]
    async fn test_missing_source_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let source = FileSource::new(dir.path());
        assert!(source.extract("users", &Filters::new()).await.unwrap().is_empty());
    }

    #[test]
    fn test_unsupported_extension() {
        let result = read_rows(Path::new("data.parquet"));
        assert!(matches!(result, Err(SourceError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_csv_value_conversion() {
        assert_eq!(csv_value(" 42 "), json!(42));
        assert_eq!(csv_value("-3.25"), json!(-3.25));
        assert_eq!(csv_value("007"), json!("007"));
        assert_eq!(csv_value("O1"), json!("O1"));
        assert_eq!(csv_value("2024-01-10"), json!("2024-01-10"));
        assert_eq!(csv_value("NaN"), json!("NaN"));
        assert_eq!(csv_value(""), Value::Null);
    }

    #[test]
    fn test_cell_value_conversion() {
        assert_eq!(cell_value(&Data::Int(3)), json!(3));
        assert_eq!(cell_value(&Data::Float(1.5)), json!(1.5));
        assert_eq!(cell_value(&Data::String("  ".to_string())), Value::Null);
        assert_eq!(cell_value(&Data::Empty), Value::Null);
    }
}
