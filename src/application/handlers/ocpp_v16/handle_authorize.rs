//! Authorize handler

use rust_ocpp::v1_6::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use rust_ocpp::v1_6::types::{AuthorizationStatus, IdTagInfo};
use tracing::info;

use crate::application::handlers::SystemHandler;
use crate::domain::{OcppResult, UserTag};

impl SystemHandler {
    pub async fn authorize(
        &self,
        charge_point_id: &str,
        req: AuthorizeRequest,
    ) -> OcppResult<AuthorizeResponse> {
        let status = self.authorize_tag(charge_point_id, &req.id_tag).await;
        let status_str = format!("{:?}", status);

        info!(
            charge_point_id,
            id_tag = req.id_tag.as_str(),
            status = status_str.as_str(),
            "Authorize"
        );
        self.events
            .on_authorize(charge_point_id, &req.id_tag, &status_str)
            .await;

        Ok(AuthorizeResponse {
            id_tag_info: IdTagInfo {
                status,
                expiry_date: None,
                parent_id_tag: None,
            },
        })
    }

    /// Resolve the tag, creating it first when tag auto-registration is on.
    pub(crate) async fn resolve_user_tag(&self, id_tag: &str) -> Option<UserTag> {
        if id_tag.is_empty() {
            return None;
        }
        match self.db.get_user_tag(id_tag).await {
            Ok(Some(tag)) => Some(tag),
            Ok(None) if self.settings.auto_register_tags => {
                let tag = UserTag::auto_registered(id_tag);
                if let Err(e) = self.db.add_user_tag(&tag).await {
                    self.log
                        .error(&format!("add_user_tag failed for {}: {}", id_tag, e));
                }
                info!(id_tag, "User tag auto-registered");
                Some(tag)
            }
            Ok(None) => None,
            Err(e) => {
                self.log
                    .error(&format!("get_user_tag failed for {}: {}", id_tag, e));
                None
            }
        }
    }

    async fn authorize_tag(&self, charge_point_id: &str, id_tag: &str) -> AuthorizationStatus {
        let Some(state) = self.store.charge_point(charge_point_id) else {
            return AuthorizationStatus::Invalid;
        };
        let Some(tag) = self.resolve_user_tag(id_tag).await else {
            return AuthorizationStatus::Invalid;
        };
        let cp_enabled = state.charge_point.read().await.enabled;
        if cp_enabled && tag.enabled {
            AuthorizationStatus::Accepted
        } else {
            AuthorizationStatus::Blocked
        }
    }
}
