use chrono::NaiveDate;

use crate::order::Disposition;

/// Serials for each slot of an order plus the target disposition.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeRequest {
    /// Raw serial per slot, in slot order.
    pub serials: Vec<String>,
    pub disposition: Disposition,
    pub loan_start: Option<NaiveDate>,
}

impl FinalizeRequest {
    pub fn new<I, T>(serials: I, disposition: Disposition, loan_start: Option<NaiveDate>) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            serials: serials.into_iter().map(Into::into).collect(),
            disposition,
            loan_start,
        }
    }

    pub fn sold<I, T>(serials: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::new(serials, Disposition::Sold, None)
    }

    pub fn on_loan<I, T>(serials: I, loan_start: Option<NaiveDate>) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::new(serials, Disposition::OnLoan, loan_start)
    }

    /// Set the loan start from form input. Anything that is not an ISO date
    /// leaves it unset.
    pub fn with_loan_start_str(mut self, raw: &str) -> Self {
        self.loan_start = parse_loan_start(raw);
        self
    }
}

/// Parse a `YYYY-MM-DD` loan start date.
pub fn parse_loan_start(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_disposition() {
        let sold = FinalizeRequest::sold(["a", "b"]);
        assert_eq!(sold.disposition, Disposition::Sold);
        assert_eq!(sold.serials, vec!["a".to_string(), "b".to_string()]);
        assert!(sold.loan_start.is_none());

        let date = NaiveDate::from_ymd_opt(2024, 1, 31);
        let lent = FinalizeRequest::on_loan(vec!["x".to_string()], date);
        assert_eq!(lent.disposition, Disposition::OnLoan);
        assert_eq!(lent.loan_start, date);
    }

    #[test]
    fn loan_start_parsing() {
        assert_eq!(
            parse_loan_start(" 2024-02-29 "),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert!(parse_loan_start("2023-02-29").is_none());
        assert!(parse_loan_start("29/02/2024").is_none());
        assert!(parse_loan_start("").is_none());

        let request = FinalizeRequest::on_loan(["x"], None).with_loan_start_str("not a date");
        assert!(request.loan_start.is_none());
    }
}
