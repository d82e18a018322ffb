//! The storefront flow catalogue.
//!
//! Turns a [`StorefrontProfile`] into the flows a shopper runs against the
//! target shop:
//!
//! | flow        | weight | auth     | journey                                              |
//! |-------------|--------|----------|------------------------------------------------------|
//! | `browse`    | 50     | no       | landing → (gate) products → product page              |
//! | `dashboard` | 25     | no       | landing                                              |
//! | `wishlist`  | 10     | required | landing → (gate) products → add → view → remove       |
//! | `purchase`  | 3      | required | landing → (gate) products → product → checkout → pay → invoice → (gate) review |
//!
//! plus the `onboarding` flow (landing → (gate) register → login) every
//! session runs once before the scheduler takes over.

use serde_json::json;

use crate::{
    config::{AuthGating, StorefrontProfile},
    error::Result,
    flow::{Flow, Sampler},
    scenario::Scenario,
    scheduler::TaskScheduler,
    step::{Extract, Fallback, FunnelStep},
};

fn dashboard_step() -> FunnelStep {
    FunnelStep::get("dashboard", "/")
}

/// Pick a product from the catalog, or make one up when no listed product
/// carries an id.
fn list_products(profile: &StorefrontProfile) -> FunnelStep {
    FunnelStep::get("list_products", "/api/products")
        .json()
        .store("product", Extract::random_element_with("id"))
        .or_fallback(Fallback::SyntheticProduct {
            catalog_bound: profile.catalog_bound,
        })
        .load_bearing()
}

fn view_product(profile: &StorefrontProfile) -> FunnelStep {
    FunnelStep::get("view_product", profile.product_path.as_str())
}

pub fn onboarding(profile: &StorefrontProfile) -> Result<Flow> {
    Flow::builder("onboarding")
        .step(dashboard_step())
        .gate("register", profile.register_probability)
        .step(
            FunnelStep::post(
                "register",
                "/api/register",
                json!({ "name": "{name}", "email": "{email}", "password": "{password}" }),
            )
            .expect([201])
            // already registered
            .tolerate([400])
            .load_bearing(),
        )
        .step(
            FunnelStep::post(
                "login",
                "/api/login",
                json!({ "email": "{email}", "password": "{password}" }),
            )
            .load_bearing()
            .authenticates(),
        )
        .build()
}

pub fn browse(profile: &StorefrontProfile) -> Result<Flow> {
    Flow::builder("browse")
        .weight(profile.weights.browse)
        .step(dashboard_step())
        .gate("browse", profile.browse_probability)
        .step(list_products(profile))
        .step(view_product(profile))
        .build()
}

pub fn dashboard(profile: &StorefrontProfile) -> Result<Flow> {
    Flow::builder("dashboard")
        .weight(profile.weights.dashboard)
        .step(dashboard_step())
        .build()
}

pub fn wishlist(profile: &StorefrontProfile) -> Result<Flow> {
    Flow::builder("wishlist")
        .weight(profile.weights.wishlist)
        .requires_auth()
        .step(dashboard_step())
        .gate("wishlist", profile.wishlist_probability)
        .step(list_products(profile))
        .step(
            FunnelStep::post(
                "add_to_wishlist",
                "/api/wishlist",
                json!({ "productId": "{product.id}" }),
            )
            .expect([200, 201]),
        )
        .step(FunnelStep::get("view_wishlist", "/wishlist"))
        .step(
            FunnelStep::delete("remove_from_wishlist", "/api/wishlist/{product.id}")
                .expect([200, 204]),
        )
        .build()
}

pub fn purchase(profile: &StorefrontProfile) -> Result<Flow> {
    let payment = &profile.payment;

    Flow::builder("purchase")
        .weight(profile.weights.purchase)
        .requires_auth()
        .draw("rating", Sampler::IntRange { low: 1, high: 5 })
        .draw("comment", Sampler::Choice(profile.review_templates.clone()))
        .step(dashboard_step())
        .gate("purchase", profile.purchase_probability)
        .step(list_products(profile))
        .step(view_product(profile))
        .step(FunnelStep::get("checkout_page", "/payment"))
        .step(
            FunnelStep::post(
                "payment_api",
                "/api/payment",
                json!({
                    "cardNumber": payment.card_number,
                    "expiry": payment.expiry,
                    "cvv": payment.cvv,
                    "cart": [{ "id": "{product.id}", "quantity": 1, "price": "{product.price|1}" }],
                    "address": payment.address,
                }),
            )
            .store("invoiceId", Extract::first_of(["invoice_id", "orderId"]))
            .load_bearing(),
        )
        .step(FunnelStep::get("view_invoice", "/invoice/{invoiceId|1}"))
        .gate("review", profile.review_probability)
        .step(view_product(profile))
        .step(FunnelStep::post(
            "api_ratings",
            "/api/ratings",
            json!({ "productId": "{product.id}", "rating": "{rating}" }),
        ))
        .step(FunnelStep::post(
            "api_comments",
            "/api/comments",
            json!({ "productId": "{product.id}", "comment_text": "{comment} ({rating} stars)" }),
        ))
        .build()
}

/// The full storefront scenario. Flows with a zero weight are left out.
pub fn scenario(profile: &StorefrontProfile) -> Result<Scenario> {
    profile.validate()?;

    let weighted: [(u32, fn(&StorefrontProfile) -> Result<Flow>); 4] = [
        (profile.weights.browse, browse),
        (profile.weights.dashboard, dashboard),
        (profile.weights.wishlist, wishlist),
        (profile.weights.purchase, purchase),
    ];
    let flows = weighted
        .into_iter()
        .filter(|(weight, _)| *weight > 0)
        .map(|(_, build)| build(profile))
        .collect::<Result<Vec<_>>>()?;

    let scheduler =
        TaskScheduler::new(flows)?.eligibility_filter(profile.auth_gating == AuthGating::Eligibility);

    Ok(Scenario::builder()
        .name("storefront")
        .scheduler(scheduler)
        .onboarding(onboarding(profile)?)
        .identity(profile.identity.clone())
        .think_time(profile.think_time())
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aggregate::{Aggregate, FunnelAggregate},
        config::FlowWeights,
        error::Failure,
        flow::{AbortReason, FlowOutcome},
        identity::Identity,
        session::SessionState,
        transport::{Method, mock::MockTransport},
    };
    use rand::{SeedableRng, rngs::StdRng};
    use serde_json::Value;

    /// Every gate open.
    fn eager() -> StorefrontProfile {
        StorefrontProfile {
            register_probability: 1.0,
            browse_probability: 1.0,
            purchase_probability: 1.0,
            review_probability: 1.0,
            wishlist_probability: 1.0,
            ..StorefrontProfile::default()
        }
    }

    fn shopper() -> SessionState {
        let mut state = SessionState::new(Identity {
            name: "LoadUser".into(),
            email: "loadgen_1@example.com".into(),
            password: "Passw0rd!".into(),
        });
        state.mark_authenticated();
        state
    }

    async fn run(flow: &Flow, transport: &MockTransport, seed: u64) -> (FlowOutcome, SessionState) {
        let mut state = shopper();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut agg = FunnelAggregate::new();
        let outcome = flow.execute(transport, &mut state, &mut rng, &mut agg).await;
        (outcome, state)
    }

    fn body_of(transport: &MockTransport, path: &str) -> Value {
        transport
            .sent()
            .into_iter()
            .find(|s| s.path == path)
            .and_then(|s| s.body)
            .unwrap()
    }

    #[tokio::test]
    async fn purchase_runs_the_whole_funnel() {
        let flow = purchase(&eager()).unwrap();
        let transport = MockTransport::new()
            .json(Method::Get, "/api/products", 200, json!([{ "id": 3, "price": 9.5 }]))
            .json(Method::Post, "/api/payment", 200, json!({ "invoice_id": 42 }));

        let (outcome, _) = run(&flow, &transport, 1).await;

        assert!(outcome.is_completed());
        assert_eq!(
            transport.paths(),
            vec![
                "/",
                "/api/products",
                "/product-page/3",
                "/payment",
                "/api/payment",
                "/invoice/42",
                "/product-page/3",
                "/api/ratings",
                "/api/comments",
            ]
        );

        let payment = body_of(&transport, "/api/payment");
        assert_eq!(payment["cart"], json!([{ "id": 3, "quantity": 1, "price": 9.5 }]));
        assert_eq!(payment["cardNumber"], "4111111111111111");

        let rating = body_of(&transport, "/api/ratings");
        assert_eq!(rating["productId"], 3);
        let stars = rating["rating"].as_i64().unwrap();
        assert!((1..=5).contains(&stars));

        let comment = body_of(&transport, "/api/comments");
        let text = comment["comment_text"].as_str().unwrap();
        assert!(text.ends_with(&format!(" ({stars} stars)")));
        assert!(eager().review_templates.iter().any(|t| text.starts_with(t.as_str())));
    }

    #[tokio::test]
    async fn order_id_and_missing_invoice_both_resolve() {
        let flow = purchase(&eager()).unwrap();

        let transport = MockTransport::new()
            .json(Method::Get, "/api/products", 200, json!([{ "id": 1 }]))
            .json(Method::Post, "/api/payment", 200, json!({ "orderId": "A-7" }));
        run(&flow, &transport, 2).await;
        assert!(transport.paths().contains(&"/invoice/A-7".to_string()));

        let transport = MockTransport::new()
            .json(Method::Get, "/api/products", 200, json!([{ "id": 1 }]))
            .on(Method::Post, "/api/payment", 200, "thanks!");
        run(&flow, &transport, 3).await;
        assert!(transport.paths().contains(&"/invoice/1".to_string()));
        // no price listed
        assert_eq!(body_of(&transport, "/api/payment")["cart"][0]["price"], 1);
    }

    #[tokio::test]
    async fn empty_catalog_still_checks_out() {
        let flow = purchase(&eager()).unwrap();
        let transport = MockTransport::new()
            .json(Method::Get, "/api/products", 200, json!([]))
            .json(Method::Post, "/api/payment", 200, json!({ "invoice_id": 9 }));

        let (outcome, state) = run(&flow, &transport, 4).await;

        assert!(outcome.is_completed());
        let id = state.value("product").unwrap()["id"].as_u64().unwrap();
        assert!((1..=7).contains(&id));
        let cart = &body_of(&transport, "/api/payment")["cart"][0];
        assert_eq!(cart["id"], id);
        assert_eq!(cart["price"], 1);
    }

    #[tokio::test]
    async fn catalog_without_ids_still_checks_out() {
        let flow = purchase(&eager()).unwrap();
        let transport = MockTransport::new()
            .json(Method::Get, "/api/products", 200, json!([{ "name": "widget", "price": 4 }]))
            .json(Method::Post, "/api/payment", 200, json!({ "invoice_id": 3 }));

        let (outcome, _) = run(&flow, &transport, 8).await;

        assert!(outcome.is_completed(), "{outcome:?}");
        let cart = &body_of(&transport, "/api/payment")["cart"][0];
        assert!((1..=7).contains(&cart["id"].as_u64().unwrap()));
        assert_eq!(cart["price"], 1);
        assert!(transport.paths().contains(&"/invoice/3".to_string()));
    }

    #[tokio::test]
    async fn unreachable_landing_page_ends_browsing() {
        let transport = MockTransport::new().unreachable(Method::Get, "/");

        let (outcome, _) = run(&browse(&eager()).unwrap(), &transport, 9).await;

        assert!(matches!(
            &outcome,
            FlowOutcome::Aborted {
                reason: AbortReason::StepFailed { step, failure: Failure::Transport(_) },
                steps: 1,
                ..
            } if step == "dashboard"
        ));
        assert_eq!(transport.paths(), vec!["/"]);
    }

    #[tokio::test]
    async fn rejected_payment_skips_the_review() {
        let flow = purchase(&eager()).unwrap();
        let transport = MockTransport::new()
            .json(Method::Get, "/api/products", 200, json!([{ "id": 2, "price": 5 }]))
            .on(Method::Post, "/api/payment", 402, "card declined");

        let (outcome, _) = run(&flow, &transport, 5).await;

        match outcome {
            FlowOutcome::Aborted {
                reason: AbortReason::StepFailed { step, .. },
                ..
            } => assert_eq!(step, "payment_api"),
            other => panic!("unexpected outcome {other:?}"),
        }
        let paths = transport.paths();
        assert!(!paths.iter().any(|p| p.starts_with("/invoice")));
        assert!(!paths.iter().any(|p| p == "/api/ratings" || p == "/api/comments"));
    }

    #[tokio::test]
    async fn closed_browse_gate_only_lands() {
        let profile = StorefrontProfile {
            browse_probability: 0.0,
            ..StorefrontProfile::default()
        };
        let transport = MockTransport::new();

        let (outcome, _) = run(&browse(&profile).unwrap(), &transport, 6).await;

        assert_eq!(
            outcome,
            FlowOutcome::Completed {
                flow: "browse".into(),
                stopped_at: Some("browse".into()),
                steps: 1,
            }
        );
        assert_eq!(transport.paths(), vec!["/"]);
    }

    #[tokio::test]
    async fn custom_product_path_is_used() {
        let profile = StorefrontProfile {
            product_path: "/products/{product.id}".into(),
            ..eager()
        };
        let transport =
            MockTransport::new().json(Method::Get, "/api/products", 200, json!([{ "id": 11 }]));

        run(&browse(&profile).unwrap(), &transport, 7).await;

        assert_eq!(transport.paths().last().unwrap(), "/products/11");
    }

    #[tokio::test]
    async fn wishlist_adds_views_and_removes() {
        let transport =
            MockTransport::new().json(Method::Get, "/api/products", 200, json!([{ "id": 4 }]));

        let (outcome, _) = run(&wishlist(&eager()).unwrap(), &transport, 8).await;

        assert!(outcome.is_completed());
        assert_eq!(
            transport.paths(),
            vec!["/", "/api/products", "/api/wishlist", "/wishlist", "/api/wishlist/4"]
        );
        assert_eq!(body_of(&transport, "/api/wishlist"), json!({ "productId": 4 }));
        assert_eq!(transport.sent()[4].method, Method::Delete);
    }

    #[tokio::test]
    async fn onboarding_registers_then_logs_in() {
        let flow = onboarding(&eager()).unwrap();
        let transport = MockTransport::new().on(Method::Post, "/api/register", 201, "");
        let mut state = SessionState::new(Identity {
            name: "LoadUser".into(),
            email: "loadgen_5@example.com".into(),
            password: "Passw0rd!".into(),
        });

        let outcome = flow
            .execute(&transport, &mut state, &mut StdRng::seed_from_u64(9), &mut FunnelAggregate::new())
            .await;

        assert!(outcome.is_completed());
        assert!(state.is_authenticated());
        assert_eq!(
            body_of(&transport, "/api/register"),
            json!({ "name": "LoadUser", "email": "loadgen_5@example.com", "password": "Passw0rd!" })
        );
        assert_eq!(
            body_of(&transport, "/api/login"),
            json!({ "email": "loadgen_5@example.com", "password": "Passw0rd!" })
        );
    }

    #[test]
    fn scenario_registers_every_weighted_flow() {
        let scenario = scenario(&StorefrontProfile::default()).unwrap();
        let names: Vec<_> = scenario.scheduler.flows().iter().map(|f| f.name.as_str()).collect();

        assert_eq!(names, vec!["browse", "dashboard", "wishlist", "purchase"]);
        assert_eq!(scenario.onboarding.as_ref().unwrap().name, "onboarding");
    }

    #[test]
    fn zero_weight_flows_are_left_out() {
        let profile = StorefrontProfile {
            weights: FlowWeights {
                wishlist: 0,
                ..FlowWeights::default()
            },
            ..StorefrontProfile::default()
        };
        let scenario = scenario(&profile).unwrap();

        assert!(scenario.scheduler.flows().iter().all(|f| f.name != "wishlist"));
    }

    #[test]
    fn runtime_gating_keeps_auth_flows_selectable() {
        let anonymous = SessionState::new(Identity {
            name: "n".into(),
            email: "e".into(),
            password: "p".into(),
        });
        let mut rng = StdRng::seed_from_u64(10);

        let filtered = scenario(&StorefrontProfile::default()).unwrap();
        let runtime = scenario(&StorefrontProfile {
            auth_gating: AuthGating::Runtime,
            ..StorefrontProfile::default()
        })
        .unwrap();

        let picks = |s: &Scenario, rng: &mut StdRng| {
            (0..2_000)
                .filter_map(|_| s.scheduler.next(&anonymous, rng))
                .filter(|f| f.requires_auth())
                .count()
        };
        assert_eq!(picks(&filtered, &mut rng), 0);
        assert!(picks(&runtime, &mut rng) > 0);
    }
}
