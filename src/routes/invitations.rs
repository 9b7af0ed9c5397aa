use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    errors::Result,
    models::invitation::{
        AcceptOutcome, CreatedInvitation, InvitationRef, InvitationStatus, RejectOutcome,
    },
    routes::{Envelope, data},
    services::invitation,
    session::CurrentUser,
    state::AppState,
    utils::validated_form::ValidatedJson,
};

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, validator::Validate)]
pub struct CreateInvitationRequest {
    #[validate(email, length(max = 255))]
    pub email: String,
}

pub async fn create_invitation(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(list_id): Path<String>,
    ValidatedJson(input): ValidatedJson<CreateInvitationRequest>,
) -> Result<(StatusCode, Json<Envelope<CreatedInvitation>>)> {
    let created = invitation::create_invitation(
        state.gateway.as_ref(),
        &state.config.app_origin,
        &list_id,
        &input.email,
        &user.id,
    )
    .await?;
    Ok((StatusCode::CREATED, data(created)))
}

pub async fn accept_invitation(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(invitation_id): Path<String>,
) -> Result<Json<Envelope<AcceptOutcome>>> {
    let outcome = invitation::accept_invitation(
        state.gateway.as_ref(),
        InvitationRef::Id(invitation_id.clone()),
        &user,
    )
    .await?;
    if outcome.success {
        state
            .settled
            .record(&invitation_id, InvitationStatus::Accepted)
            .await;
    }
    Ok(data(outcome))
}

pub async fn reject_invitation(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(invitation_id): Path<String>,
) -> Result<Json<Envelope<RejectOutcome>>> {
    let outcome =
        invitation::reject_invitation(state.gateway.as_ref(), &invitation_id, &user).await?;
    if outcome.success {
        state
            .settled
            .record(&invitation_id, InvitationStatus::Rejected)
            .await;
    }
    Ok(data(outcome))
}
