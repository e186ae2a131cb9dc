use common::Cid;

use crate::OrderDocument;

/// Builder for role-scoped order listings.
///
/// All set filters must match. Results are returned newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Filter by the buying account.
    pub buyer: Option<Cid>,

    /// Filter by the selling account.
    pub seller: Option<Cid>,

    /// Filter by the assigned transporter.
    pub transporter: Option<Cid>,

    /// Filter by status (any of these).
    pub statuses: Option<Vec<String>>,

    /// Only orders with no transporter assigned.
    pub unassigned_only: bool,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,
}

impl OrderQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders placed by a buyer.
    pub fn for_buyer(buyer: Cid) -> Self {
        Self {
            buyer: Some(buyer),
            ..Default::default()
        }
    }

    /// Orders for products listed by a seller.
    pub fn for_seller(seller: Cid) -> Self {
        Self {
            seller: Some(seller),
            ..Default::default()
        }
    }

    /// Orders assigned to a transporter.
    pub fn for_transporter(transporter: Cid) -> Self {
        Self {
            transporter: Some(transporter),
            ..Default::default()
        }
    }

    /// Filters by a single status.
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.statuses = Some(vec![status.into()]);
        self
    }

    /// Filters by any of several statuses.
    pub fn statuses(mut self, statuses: Vec<String>) -> Self {
        self.statuses = Some(statuses);
        self
    }

    /// Restricts to orders without a transporter.
    pub fn unassigned(mut self) -> Self {
        self.unassigned_only = true;
        self
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if the document satisfies every filter.
    pub fn matches(&self, doc: &OrderDocument) -> bool {
        if let Some(ref buyer) = self.buyer
            && &doc.buyer != buyer
        {
            return false;
        }
        if let Some(ref seller) = self.seller
            && &doc.seller != seller
        {
            return false;
        }
        if let Some(ref transporter) = self.transporter
            && doc.transporter.as_ref() != Some(transporter)
        {
            return false;
        }
        if let Some(ref statuses) = self.statuses
            && !statuses.contains(&doc.status)
        {
            return false;
        }
        if self.unassigned_only && doc.transporter.is_some() {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Version;
    use chrono::Utc;
    use common::OrderId;

    fn cid(n: u64) -> Cid {
        Cid::parse(format!("{n:011}")).unwrap()
    }

    fn doc(transporter: Option<Cid>, status: &str) -> OrderDocument {
        OrderDocument {
            order_id: OrderId::new(),
            buyer: cid(1),
            seller: cid(2),
            transporter,
            status: status.to_string(),
            version: Version::first(),
            created_at: Utc::now(),
            payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(OrderQuery::new().matches(&doc(None, "placed")));
    }

    #[test]
    fn filters_combine() {
        let query = OrderQuery::for_seller(cid(2)).status("shipped").unassigned();
        assert!(query.matches(&doc(None, "shipped")));
        assert!(!query.matches(&doc(Some(cid(3)), "shipped")));
        assert!(!query.matches(&doc(None, "placed")));
        assert!(!OrderQuery::for_buyer(cid(9)).matches(&doc(None, "shipped")));
    }

    #[test]
    fn transporter_filter_requires_assignment() {
        let query = OrderQuery::for_transporter(cid(3));
        assert!(query.matches(&doc(Some(cid(3)), "out-for-delivery")));
        assert!(!query.matches(&doc(None, "shipped")));
    }
}
