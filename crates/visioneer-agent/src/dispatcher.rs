//! Action dispatcher: runs the handler for one classified utterance.
//!
//! Handlers read and update the session context they are given, call the
//! catalog and language model through timeout-bounded collaborator calls,
//! and report every failure as an `ActionResult` with `success: false`.
//! Mutations are only attempted after the actor is confirmed as the owner
//! of an active target product.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use visioneer_core::config::AgentConfig;
use visioneer_core::types::Product;

use crate::catalog::{stock_below_zero, Catalog};
use crate::error::AgentError;
use crate::intent::extract::{self, StockInstruction};
use crate::llm::{build_messages, LanguageModel};
use crate::types::{ActionPayload, ActionResult, Actor, Intent, Session};

/// Feature labels reported with pricing advice.
pub const PRICING_FEATURES: [&str; 4] = ["market_research", "optimization", "dynamic", "updates"];

/// Feature labels reported with analytics help.
pub const ANALYTICS_FEATURES: [&str; 4] = ["sales", "products", "customers", "inventory"];

fn too_many_units() -> AgentError {
    AgentError::InvalidValue(format!(
        "That's more units than I can record. Stock can be at most {}.",
        extract::MAX_STOCK_QUANTITY
    ))
}

/// Follow-ups offered with the general greeting.
const GENERAL_SUGGESTIONS: [&str; 3] = [
    "Show me sneakers under $100",
    "Tell me about product 1",
    "Add 5 units",
];

pub struct ActionDispatcher {
    catalog: Arc<dyn Catalog>,
    llm: Option<Arc<dyn LanguageModel>>,
    config: AgentConfig,
}

impl ActionDispatcher {
    pub fn new(catalog: Arc<dyn Catalog>, config: AgentConfig) -> Self {
        Self {
            catalog,
            llm: None,
            config,
        }
    }

    /// Route general turns through `llm` instead of the template reply.
    pub fn with_language_model(mut self, llm: Arc<dyn LanguageModel>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.collaborator_timeout_ms)
    }

    /// Await a catalog call, failing with `CatalogUnavailable` on timeout.
    async fn catalog_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, AgentError>>,
    ) -> Result<T, AgentError> {
        tokio::time::timeout(self.timeout(), call)
            .await
            .map_err(|_| {
                AgentError::CatalogUnavailable(format!(
                    "{} timed out after {}ms",
                    operation, self.config.collaborator_timeout_ms
                ))
            })?
    }

    /// Handle one utterance. Never fails; errors become failed results.
    pub async fn dispatch(
        &self,
        intent: Intent,
        text: &str,
        session: &mut Session,
        actor: Option<&Actor>,
    ) -> ActionResult {
        let outcome = match intent {
            Intent::ProductSearch => self.search(text, session).await,
            Intent::ProductDetail => self.detail(text, session).await,
            Intent::PriceUpdate => self.update_price(text, session, actor).await,
            Intent::InventoryUpdate => self.update_inventory(text, session, actor).await,
            Intent::Purchase => self.purchase(text, session).await,
            Intent::PricingAdvice => Ok(self.advice(intent)),
            Intent::Analytics => Ok(self.advice(intent)),
            Intent::General => Ok(self.general(session).await),
        };

        session.context.last_intent = Some(intent);
        match outcome {
            Ok(result) => {
                session.context.pending_intent = None;
                result
            }
            Err(err) => {
                warn!(
                    session_id = %session.id,
                    intent = %intent,
                    error = %err,
                    "Action failed"
                );
                session.context.pending_intent = match err {
                    AgentError::NoTargetProduct | AgentError::UnparsableValue(_)
                        if intent.is_mutating() =>
                    {
                        Some(intent)
                    }
                    _ => None,
                };
                ActionResult::failure(intent, &err)
            }
        }
    }

    fn resolve_target(&self, text: &str, session: &Session) -> Option<i64> {
        extract::extract_product_id(text).or(session.context.last_product_id)
    }

    async fn search(&self, text: &str, session: &mut Session) -> Result<ActionResult, AgentError> {
        let query = extract::extract_search_constraints(text, &self.config);
        let mut products = self
            .catalog_call("find_products", self.catalog.find_products(&query))
            .await?;
        products.truncate(self.config.max_search_results);

        debug!(session_id = %session.id, found = products.len(), ?query, "Search complete");
        if let [only] = products.as_slice() {
            session.context.last_product_id = Some(only.id);
        }
        session.context.last_search = Some(query.clone());

        let message = match products.len() {
            0 => "No matching products".to_string(),
            1 => "Found 1 product".to_string(),
            n => format!("Found {} products", n),
        };
        Ok(ActionResult::ok(
            Intent::ProductSearch,
            message,
            ActionPayload::Search {
                total_found: products.len(),
                products: products.iter().map(Product::summary).collect(),
                constraints: query,
            },
        ))
    }

    async fn detail(&self, text: &str, session: &mut Session) -> Result<ActionResult, AgentError> {
        let id = self
            .resolve_target(text, session)
            .ok_or(AgentError::NoTargetProduct)?;
        let product = self.active_product(id).await?;

        session.context.last_product_id = Some(product.id);
        session.context.last_price = Some(product.price);
        session.context.last_stock = Some(product.stock_quantity);

        Ok(ActionResult::ok(
            Intent::ProductDetail,
            product.name.clone(),
            ActionPayload::Detail { product },
        ))
    }

    /// An active product by id; unknown or inactive ids read as a bad value.
    async fn active_product(&self, id: i64) -> Result<Product, AgentError> {
        self.catalog_call("get_product", self.catalog.get_product(id))
            .await?
            .filter(|product| product.is_active)
            .ok_or_else(|| {
                AgentError::InvalidValue(format!(
                    "I couldn't find product {}. Could you check the number?",
                    id
                ))
            })
    }

    /// The target product, provided `actor` is a seller who owns it.
    ///
    /// Missing, inactive and foreign products are indistinguishable.
    async fn owned_product(&self, id: i64, actor: &Actor) -> Result<Product, AgentError> {
        self.catalog_call("get_product", self.catalog.get_product(id))
            .await?
            .filter(|product| product.is_active && product.seller_id == actor.user_id)
            .ok_or(AgentError::NotAuthorized)
    }

    async fn update_price(
        &self,
        text: &str,
        session: &mut Session,
        actor: Option<&Actor>,
    ) -> Result<ActionResult, AgentError> {
        let actor = actor
            .filter(|a| a.can_manage_listings())
            .ok_or(AgentError::NotAuthorized)?;
        let id = self
            .resolve_target(text, session)
            .ok_or(AgentError::NoTargetProduct)?;
        let current = self.owned_product(id, actor).await?;
        session.context.last_product_id = Some(id);

        let price = extract::extract_price(text).ok_or(AgentError::UnparsableValue("price"))?;
        if !price.is_finite() || price <= 0.0 {
            return Err(AgentError::InvalidValue(
                "A price has to be more than zero. What should it be?".to_string(),
            ));
        }

        let updated = self
            .catalog_call("update_price", self.catalog.update_price(id, price, actor))
            .await?;

        info!(
            session_id = %session.id,
            product_id = id,
            seller_id = actor.user_id,
            old_price = current.price,
            new_price = updated.price,
            "Price updated"
        );
        session.context.last_price = Some(updated.price);

        Ok(ActionResult::ok(
            Intent::PriceUpdate,
            format!("Price updated to ${:.2}", updated.price),
            ActionPayload::PriceUpdate {
                product_id: id,
                product_name: updated.name,
                old_price: current.price,
                new_price: updated.price,
            },
        ))
    }

    async fn update_inventory(
        &self,
        text: &str,
        session: &mut Session,
        actor: Option<&Actor>,
    ) -> Result<ActionResult, AgentError> {
        let actor = actor
            .filter(|a| a.can_manage_listings())
            .ok_or(AgentError::NotAuthorized)?;
        let id = self
            .resolve_target(text, session)
            .ok_or(AgentError::NoTargetProduct)?;
        let current = self.owned_product(id, actor).await?;
        session.context.last_product_id = Some(id);

        let instruction =
            extract::extract_stock_change(text).ok_or(AgentError::UnparsableValue("quantity"))?;
        let delta = match instruction {
            StockInstruction::Delta(delta) => Some(delta),
            StockInstruction::Set(target) => target.checked_sub(current.stock_quantity),
        };
        let new_stock = delta.and_then(|d| current.stock_quantity.checked_add(d));
        let (delta, new_stock) = match (delta, new_stock) {
            (Some(delta), Some(new_stock)) if new_stock <= extract::MAX_STOCK_QUANTITY => {
                (delta, new_stock)
            }
            _ => return Err(too_many_units()),
        };
        if new_stock < 0 {
            return Err(stock_below_zero(current.stock_quantity));
        }

        let updated = if delta == 0 {
            current
        } else {
            self.catalog_call("update_stock", self.catalog.update_stock(id, delta, actor))
                .await?
        };
        let old_stock = updated.stock_quantity.saturating_sub(delta);

        info!(
            session_id = %session.id,
            product_id = id,
            seller_id = actor.user_id,
            old_stock,
            new_stock = updated.stock_quantity,
            "Stock updated"
        );
        session.context.last_stock = Some(updated.stock_quantity);

        Ok(ActionResult::ok(
            Intent::InventoryUpdate,
            format!("Stock is now {}", updated.stock_quantity),
            ActionPayload::InventoryUpdate {
                product_id: id,
                product_name: updated.name,
                old_stock,
                new_stock: updated.stock_quantity,
                delta,
            },
        ))
    }

    async fn purchase(&self, text: &str, session: &mut Session) -> Result<ActionResult, AgentError> {
        let id = self
            .resolve_target(text, session)
            .ok_or(AgentError::NoTargetProduct)?;
        let quantity = extract::extract_quantity(text).unwrap_or(1);
        if quantity <= 0 {
            return Err(AgentError::InvalidValue(
                "You'll need to order at least one.".to_string(),
            ));
        }

        let product = self.active_product(id).await?;
        session.context.last_product_id = Some(product.id);
        if product.stock_quantity < quantity {
            return Err(AgentError::InsufficientStock {
                available: product.stock_quantity,
                requested: quantity,
            });
        }

        let total = product.price * quantity as f64;
        Ok(ActionResult::ok(
            Intent::Purchase,
            format!("Order summary for {}", product.name),
            ActionPayload::Purchase {
                product_id: product.id,
                product_name: product.name,
                quantity,
                unit_price: product.price,
                total,
            },
        ))
    }

    fn advice(&self, intent: Intent) -> ActionResult {
        let (topic, features, headline) = match intent {
            Intent::Analytics => ("analytics", ANALYTICS_FEATURES, "Store analytics"),
            _ => ("pricing", PRICING_FEATURES, "Pricing help"),
        };
        ActionResult::ok(
            intent,
            headline,
            ActionPayload::Advice {
                topic: topic.to_string(),
                features: features.iter().map(|f| f.to_string()).collect(),
            },
        )
    }

    async fn general(&self, session: &Session) -> ActionResult {
        let suggestions: Vec<String> = GENERAL_SUGGESTIONS.iter().map(|s| s.to_string()).collect();

        if let Some(llm) = &self.llm {
            let messages = build_messages(&session.turns, self.config.max_conversation_history);
            match tokio::time::timeout(self.timeout(), llm.complete(&messages)).await {
                Ok(Ok(reply)) => {
                    return ActionResult::ok(
                        Intent::General,
                        reply,
                        ActionPayload::Chat {
                            model_generated: true,
                            suggestions,
                        },
                    );
                }
                Ok(Err(err)) => {
                    warn!(session_id = %session.id, error = %err, "Language model failed; using template")
                }
                Err(_) => {
                    warn!(session_id = %session.id, "Language model timed out; using template")
                }
            }
        }

        ActionResult::ok(
            Intent::General,
            "Hi! I can help you find products and answer questions about them. \
             Sellers can also update prices and stock just by asking.",
            ActionPayload::Chat {
                model_generated: false,
                suggestions,
            },
        )
    }
}
