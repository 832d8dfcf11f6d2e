use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tera::Tera;

use procura_core::domain::actor::UserId;
use procura_core::domain::item::RequestItem;
use procura_core::domain::order::{OrderContent, OrderLine};
use procura_core::domain::request::PurchaseRequest;

use crate::llm::LlmClient;

/// Everything the producer needs to draft an order for an approved request.
#[derive(Clone, Debug)]
pub struct OrderContext {
    pub request: PurchaseRequest,
    pub items: Vec<RequestItem>,
    pub generated_by: Option<UserId>,
}

/// The purchase-order generator. Called exactly once per request on the
/// approval path; the backfill maintenance operation may call it again for
/// requests whose first generation failed, so implementations must be safe
/// to retry.
#[async_trait]
pub trait OrderProducer: Send + Sync {
    async fn generate(&self, ctx: &OrderContext) -> Result<OrderContent>;
}

/// Numbers, lines and totals are copied from the approved request by code;
/// only the free-text terms paragraph comes from the model.
pub struct LlmOrderProducer {
    llm: Arc<dyn LlmClient>,
}

impl LlmOrderProducer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

fn po_number(ctx: &OrderContext) -> String {
    let short: String = ctx.request.id.0.chars().take(8).collect();
    format!("PO-{}", short.to_ascii_uppercase())
}

fn order_lines(items: &[RequestItem]) -> (Vec<OrderLine>, Decimal) {
    let lines: Vec<OrderLine> = items
        .iter()
        .map(|item| OrderLine {
            name: item.name.clone(),
            qty: item.qty,
            unit_price: item.unit_price,
            total: item.total_price(),
        })
        .collect();
    let mut total: Decimal = lines.iter().map(|line| line.total).sum();
    total.rescale(2);
    (lines, total)
}

fn terms_prompt(ctx: &OrderContext) -> String {
    format!(
        "Draft a short terms-and-delivery paragraph for a purchase order.\n\
         Vendor: {vendor}\n\
         Order title: {title}\n\
         Item count: {count}\n\
         Reply with the paragraph only, no heading, at most three sentences.",
        vendor = ctx.request.vendor,
        title = ctx.request.title,
        count = ctx.items.len(),
    )
}

#[async_trait]
impl OrderProducer for LlmOrderProducer {
    async fn generate(&self, ctx: &OrderContext) -> Result<OrderContent> {
        let (lines, total) = order_lines(&ctx.items);
        let terms = self
            .llm
            .complete(&terms_prompt(ctx))
            .await
            .context("drafting purchase order terms")?;

        Ok(OrderContent {
            po_number: po_number(ctx),
            title: ctx.request.title.clone(),
            vendor: ctx.request.vendor.clone(),
            lines,
            total,
            terms: terms.trim().to_string(),
        })
    }
}

/// Offline producer: same structured payload, fixed boilerplate terms. Used
/// by tests and by deployments without a model backend.
#[derive(Clone, Debug, Default)]
pub struct DeterministicOrderProducer;

#[async_trait]
impl OrderProducer for DeterministicOrderProducer {
    async fn generate(&self, ctx: &OrderContext) -> Result<OrderContent> {
        let (lines, total) = order_lines(&ctx.items);
        Ok(OrderContent {
            po_number: po_number(ctx),
            title: ctx.request.title.clone(),
            vendor: ctx.request.vendor.clone(),
            lines,
            total,
            terms: "Payment due net 30 days from delivery. Goods per attached request."
                .to_string(),
        })
    }
}

const ORDER_TEMPLATE: &str = "\
PURCHASE ORDER {{ po_number }}
Vendor: {{ vendor }}
Subject: {{ title }}

{% for line in lines -%}
{{ line.qty }} x {{ line.name }} @ {{ line.unit_price }} = {{ line.total }}
{% endfor -%}

TOTAL: {{ total }}

Terms:
{{ terms }}
";

/// Renders the human-readable order document that gets attached to the
/// stored order row.
pub struct TemplateOrderRenderer {
    tera: Tera,
}

impl TemplateOrderRenderer {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template("purchase_order.txt", ORDER_TEMPLATE)
            .context("registering purchase order template")?;
        Ok(Self { tera })
    }

    pub fn render(&self, content: &OrderContent) -> Result<String> {
        let context =
            tera::Context::from_serialize(content).context("serializing order content")?;
        self.tera
            .render("purchase_order.txt", &context)
            .context("rendering purchase order document")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use procura_core::domain::actor::UserId;
    use procura_core::domain::item::{ItemId, RequestItem};
    use procura_core::domain::request::{PurchaseRequest, RequestId, RequestStatus};

    use crate::llm::StaticLlmClient;

    use super::{
        DeterministicOrderProducer, LlmOrderProducer, OrderContext, OrderProducer,
        TemplateOrderRenderer,
    };

    fn context() -> OrderContext {
        let now = Utc::now();
        OrderContext {
            request: PurchaseRequest {
                id: RequestId("a1b2c3d4-0000-0000-0000-000000000000".to_string()),
                title: "Laptops for onboarding".to_string(),
                description: String::new(),
                vendor: "Acme Supplies".to_string(),
                amount: Decimal::new(310000, 2),
                status: RequestStatus::Approved,
                created_by: UserId("u-staff".to_string()),
                last_approved_by: Some(UserId("u-l2".to_string())),
                proforma_ref: None,
                receipt_ref: None,
                created_at: now,
                updated_at: now,
            },
            items: vec![
                RequestItem {
                    id: ItemId("i-1".to_string()),
                    request_id: RequestId("a1b2c3d4".to_string()),
                    name: "Laptop".to_string(),
                    qty: 2,
                    unit_price: Decimal::new(150000, 2),
                },
                RequestItem {
                    id: ItemId("i-2".to_string()),
                    request_id: RequestId("a1b2c3d4".to_string()),
                    name: "Mouse".to_string(),
                    qty: 5,
                    unit_price: Decimal::new(2000, 2),
                },
            ],
            generated_by: Some(UserId("u-l2".to_string())),
        }
    }

    #[tokio::test]
    async fn structured_payload_is_derived_from_the_request_not_the_model() {
        let producer =
            LlmOrderProducer::new(Arc::new(StaticLlmClient::new("  Deliver within 14 days.  ")));

        let content = producer.generate(&context()).await.expect("generate");

        assert_eq!(content.po_number, "PO-A1B2C3D4");
        assert_eq!(content.vendor, "Acme Supplies");
        assert_eq!(content.lines.len(), 2);
        assert_eq!(content.total.to_string(), "3100.00");
        assert_eq!(content.terms, "Deliver within 14 days.");
    }

    #[tokio::test]
    async fn deterministic_producer_matches_the_llm_payload_shape() {
        let content = DeterministicOrderProducer.generate(&context()).await.expect("generate");
        assert_eq!(content.total.to_string(), "3100.00");
        assert!(!content.terms.is_empty());
    }

    #[tokio::test]
    async fn rendered_document_lists_every_line_and_the_total() {
        let content = DeterministicOrderProducer.generate(&context()).await.expect("generate");
        let renderer = TemplateOrderRenderer::new().expect("renderer");

        let document = renderer.render(&content).expect("render");

        assert!(document.contains("PURCHASE ORDER PO-A1B2C3D4"));
        assert!(document.contains("2 x Laptop"));
        assert!(document.contains("5 x Mouse"));
        assert!(document.contains("TOTAL: 3100.00"));
    }
}
