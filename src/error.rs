//! Error types for the import pipeline
//!
//! Only failures that abort a whole import live here. Row-level problems are
//! never errors: they end up as [`ImportIssue`](crate::types::ImportIssue)s
//! inside the [`ImportResult`](crate::types::ImportResult).

use thiserror::Error;
use uuid::Uuid;

/// The uploaded file could not be turned into a table.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Formato de arquivo não suportado: '{0}' (use .csv, .xlsx ou .xls)")]
    UnsupportedFormat(String),

    #[error("Falha ao ler CSV: {0}")]
    Csv(String),

    #[error("Falha ao ler planilha: {0}")]
    Spreadsheet(String),

    #[error("A planilha não possui abas")]
    NoSheets,

    #[error("O arquivo não contém linhas")]
    Empty,

    #[error("O arquivo não contém registros abaixo do cabeçalho")]
    NoDataRows,
}

impl From<csv::Error> for ParseError {
    fn from(e: csv::Error) -> Self {
        ParseError::Csv(e.to_string())
    }
}

impl From<calamine::Error> for ParseError {
    fn from(e: calamine::Error) -> Self {
        ParseError::Spreadsheet(e.to_string())
    }
}

/// The column mapping cannot be committed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("Campos obrigatórios sem coluna: {}", .0.join(", "))]
    MissingRequired(Vec<String>),

    #[error("Campo desconhecido: '{0}'")]
    UnknownField(String),

    #[error("Coluna '{column}' não existe no cabeçalho (campo '{field}')")]
    UnknownColumn { field: String, column: String },

    #[error("Coluna {index} fora do intervalo para o campo '{field}' ({width} colunas)")]
    ColumnOutOfRange {
        field: String,
        index: usize,
        width: usize,
    },
}

/// Import aborted before any row was processed.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

/// Persistence failures surfaced by a [`ClientStore`](crate::db::ClientStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Cliente {0} não encontrado")]
    ClientNotFound(Uuid),

    #[error("Erro de banco de dados: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Erro de serialização: {0}")]
    Serialization(#[from] serde_json::Error),
}
