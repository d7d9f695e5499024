//! CPF / CNPJ formatting and checksum validation

/// Kind of Brazilian tax document, decided by digit count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Cpf,
    Cnpj,
}

impl DocumentKind {
    pub fn of(raw: &str) -> Option<Self> {
        match digits(raw).len() {
            11 => Some(DocumentKind::Cpf),
            14 => Some(DocumentKind::Cnpj),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::Cpf => "CPF",
            DocumentKind::Cnpj => "CNPJ",
        }
    }
}

const CNPJ_WEIGHTS_1: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
const CNPJ_WEIGHTS_2: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

pub fn digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// `###.###.###-##` for 11 digits, `##.###.###/####-##` for 14, otherwise the
/// raw value untouched.
pub fn format_document(raw: &str) -> String {
    let d = digits(raw);
    match d.len() {
        11 => format!("{}.{}.{}-{}", &d[0..3], &d[3..6], &d[6..9], &d[9..11]),
        14 => format!("{}.{}.{}/{}-{}", &d[0..2], &d[2..5], &d[5..8], &d[8..12], &d[12..14]),
        _ => raw.to_string(),
    }
}

pub fn validate_cpf(raw: &str) -> bool {
    let d = digit_values(raw);
    if d.len() != 11 || is_repeated(&d) {
        return false;
    }

    let first = check_digit(d[..9].iter().zip((2..=10).rev()).map(|(v, w)| v * w).sum());
    let second = check_digit(d[..10].iter().zip((2..=11).rev()).map(|(v, w)| v * w).sum());

    d[9] == first && d[10] == second
}

pub fn validate_cnpj(raw: &str) -> bool {
    let d = digit_values(raw);
    if d.len() != 14 || is_repeated(&d) {
        return false;
    }

    let first = check_digit(d[..12].iter().zip(CNPJ_WEIGHTS_1).map(|(v, w)| v * w).sum());
    let second = check_digit(d[..13].iter().zip(CNPJ_WEIGHTS_2).map(|(v, w)| v * w).sum());

    d[12] == first && d[13] == second
}

/// Validate by length: 11 digits as CPF, 14 as CNPJ, anything else is invalid.
pub fn validate_document(raw: &str) -> bool {
    match DocumentKind::of(raw) {
        Some(DocumentKind::Cpf) => validate_cpf(raw),
        Some(DocumentKind::Cnpj) => validate_cnpj(raw),
        None => false,
    }
}

fn digit_values(raw: &str) -> Vec<u32> {
    raw.chars().filter_map(|c| c.to_digit(10)).collect()
}

fn is_repeated(d: &[u32]) -> bool {
    d.windows(2).all(|w| w[0] == w[1])
}

fn check_digit(sum: u32) -> u32 {
    let rest = sum % 11;
    if rest < 2 {
        0
    } else {
        11 - rest
    }
}
