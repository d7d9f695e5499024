//! Human-readable import summary (pt-BR)

use crate::defaults::REPORT_MAX_ISSUES;
use crate::types::{ImportIssue, ImportKind, ImportResult};

fn kind_label(kind: ImportKind) -> &'static str {
    match kind {
        ImportKind::Clients => "Importação de clientes",
        ImportKind::Invoices => "Importação de faturas",
    }
}

fn issue_line(issue: &ImportIssue) -> String {
    let mut line = format!("  Linha {}", issue.row_number);
    if !issue.field.is_empty() {
        line.push_str(&format!(" [{}]", issue.field));
    }
    line.push_str(&format!(": {}", issue.message));
    if let Some(value) = &issue.original_value {
        line.push_str(&format!(" (valor: '{}')", value));
    }
    line
}

/// At most [`REPORT_MAX_ISSUES`] lines, then "… e mais N".
fn section(lines: &mut Vec<String>, title: &str, entries: Vec<String>) {
    if entries.is_empty() {
        return;
    }
    lines.push(String::new());
    lines.push(format!("{} ({}):", title, entries.len()));
    let hidden = entries.len().saturating_sub(REPORT_MAX_ISSUES);
    lines.extend(entries.into_iter().take(REPORT_MAX_ISSUES));
    if hidden > 0 {
        lines.push(format!("  … e mais {}", hidden));
    }
}

pub fn format_report(result: &ImportResult) -> String {
    let mut lines = vec![
        kind_label(result.kind).to_string(),
        format!("Linhas lidas: {}", result.total),
        format!(
            "Importadas com sucesso: {} (novas: {}, atualizadas: {}, já existentes: {})",
            result.success, result.created, result.updated, result.duplicates
        ),
    ];
    if result.skipped > 0 {
        lines.push(format!("Ignoradas (dados obrigatórios ausentes): {}", result.skipped));
    }
    lines.push(format!("Erros: {}", result.errors.len()));
    if !result.plants_created.is_empty() {
        let names: Vec<&str> = result.plants_created.iter().map(String::as_str).collect();
        lines.push(format!("Usinas criadas: {}", names.join(", ")));
    }

    section(&mut lines, "Erros", result.errors.iter().map(issue_line).collect());
    section(&mut lines, "Avisos", result.warnings.iter().map(issue_line).collect());
    section(
        &mut lines,
        "Instalações sem cliente",
        result
            .not_found
            .iter()
            .map(|entry| format!("  Linha {}: {}", entry.row_number, entry.key))
            .collect(),
    );

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NotFoundEntry;

    #[test]
    fn test_report_totals() {
        let mut result = ImportResult::new(ImportKind::Clients, 3);
        result.success = 2;
        result.created = 2;
        result.skipped = 1;
        result.push_issue(ImportIssue::warning(3, "CPF", "CPF inválido").with_value("123.456.789-00"));

        let report = format_report(&result);
        assert!(report.starts_with("Importação de clientes\n"));
        assert!(report.contains("Linhas lidas: 3"));
        assert!(report.contains("Importadas com sucesso: 2 (novas: 2"));
        assert!(report.contains("Ignoradas (dados obrigatórios ausentes): 1"));
        assert!(report.contains("Avisos (1):"));
        assert!(report.contains("  Linha 3 [CPF]: CPF inválido (valor: '123.456.789-00')"));
        assert!(!report.contains("Erros ("));
    }

    #[test]
    fn test_report_truncates_issues() {
        let mut result = ImportResult::new(ImportKind::Invoices, 25);
        for row in 2..27 {
            result.push_issue(ImportIssue::error(row, "Vencimento", "Data de vencimento ausente"));
        }

        let report = format_report(&result);
        assert!(report.contains("Erros (25):"));
        assert!(report.contains("Linha 21 "));
        assert!(!report.contains("Linha 22 "));
        assert!(report.contains("… e mais 5"));
    }

    #[test]
    fn test_report_lists_not_found() {
        let mut result = ImportResult::new(ImportKind::Invoices, 1);
        result.not_found.push(NotFoundEntry {
            row_number: 8,
            key: "instalação 999".to_string(),
        });

        let report = format_report(&result);
        assert!(report.contains("Instalações sem cliente (1):"));
        assert!(report.contains("Linha 8: instalação 999"));
    }
}
