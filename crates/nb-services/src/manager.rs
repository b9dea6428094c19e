use std::sync::Arc;

use nb_core::config::CoreConfig;
use nb_core::error::Result;
use nb_core::traits::{CommentNotifier, Repositories};

use crate::{CommentService, PostService, SubscriptionMetrics, SubscriptionService};

/// The three services exposed to transport adapters.
pub struct Services {
    pub post: Arc<PostService>,
    pub comment: Arc<CommentService>,
    pub subscription: Arc<SubscriptionService>,
}

/// Wires the services over one repository bundle and owns their shared
/// lifecycle: health, metrics, and shutdown.
pub struct ServiceManager {
    services: Services,
}

impl ServiceManager {
    /// Construction order matters: the subscription service first, then the
    /// comment service that emits into it, then the post service. Must be
    /// called from within a runtime (the notifier starts its reaper task).
    pub fn new(repos: Repositories, config: CoreConfig) -> Self {
        log::info!("initializing service manager");

        let subscription = Arc::new(SubscriptionService::new(&config));
        let notifier: Arc<dyn CommentNotifier> = subscription.clone();
        let comment = Arc::new(CommentService::new(&repos, config.clone(), Some(notifier)));
        let post = Arc::new(PostService::new(&repos, config));

        ServiceManager {
            services: Services {
                post,
                comment,
                subscription,
            },
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn posts(&self) -> &PostService {
        &self.services.post
    }

    pub fn comments(&self) -> &CommentService {
        &self.services.comment
    }

    pub fn subscriptions(&self) -> &SubscriptionService {
        &self.services.subscription
    }

    /// Cross-service health check; today the notifier invariant is the only
    /// thing that can degrade without a request failing first.
    pub async fn health(&self) -> Result<()> {
        self.services.subscription.health_check().await
    }

    pub async fn metrics(&self) -> SubscriptionMetrics {
        self.services.subscription.metrics().await
    }

    /// Shuts the notifier down, closing every live subscription stream.
    pub async fn close(&self) {
        log::info!("shutting down service manager");
        self.services.subscription.shutdown().await;
    }
}
