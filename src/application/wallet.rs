use super::bridge::{ExternalCallbackBridge, ExternalSurface};
use super::channel::{StateChannel, StateStream};
use crate::domain::payment::{PaymentResult, WalletAuthorization, WalletRequest};
use crate::domain::ports::{HostArc, InteractorArc};
use crate::domain::state::PresentationContext;
use crate::error::{ExternalSurfaceError, FlowError, Result};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info};

/// A wallet payment sheet rendered by the platform.
pub trait WalletSheet:
    ExternalSurface<Request = WalletRequest, Output = WalletAuthorization>
{
    fn is_presentable(&self) -> bool;

    fn unavailability_reason(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum WalletAvailability {
    #[default]
    Unknown,
    Available,
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct WalletState {
    pub availability: WalletAvailability,
    pub is_loading: bool,
}

impl WalletState {
    pub fn can_pay(&self) -> bool {
        self.availability == WalletAvailability::Available && !self.is_loading
    }
}

/// Single-step wallet flow: present the sheet, tokenize the authorization,
/// create the payment.
pub struct WalletScope {
    sheet: Arc<dyn WalletSheet>,
    interactor: InteractorArc,
    host: HostArc,
    request: WalletRequest,
    presentation_context: PresentationContext,
    bridge: ExternalCallbackBridge<WalletAuthorization>,
    channel: StateChannel<WalletState>,
    pay_in_flight: AtomicBool,
    cancel_requested: AtomicBool,
}

/// Releases the pay claim even if the `pay()` future is dropped.
struct PayClaim<'a> {
    in_flight: &'a AtomicBool,
}

impl Drop for PayClaim<'_> {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

impl WalletScope {
    pub fn new(
        sheet: Arc<dyn WalletSheet>,
        interactor: InteractorArc,
        host: HostArc,
        request: WalletRequest,
        presentation_context: PresentationContext,
        sheet_timeout: Option<Duration>,
    ) -> Self {
        Self {
            sheet,
            interactor,
            host,
            request,
            presentation_context,
            bridge: ExternalCallbackBridge::with_timeout(sheet_timeout),
            channel: StateChannel::new(WalletState::default()),
            pay_in_flight: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> StateStream<WalletState> {
        self.channel.subscribe()
    }

    pub fn current_state(&self) -> WalletState {
        self.channel.current()
    }

    pub fn presentation_context(&self) -> PresentationContext {
        self.presentation_context
    }

    /// Resolves whether the sheet can be shown on this device.
    pub fn start(&self) {
        let availability = if self.sheet.is_presentable() {
            WalletAvailability::Available
        } else {
            WalletAvailability::Unavailable(
                self.sheet
                    .unavailability_reason()
                    .unwrap_or_else(|| "wallet is not available".to_string()),
            )
        };
        debug!(?availability, "wallet availability resolved");
        self.channel.update(|state| {
            (state.availability != availability).then(|| WalletState {
                availability: availability.clone(),
                ..state.clone()
            })
        });
    }

    /// Presents the sheet and completes the payment. A no-op while the
    /// wallet is unavailable or a payment is already in progress, including
    /// one the user has cancelled but that has not unwound yet.
    pub async fn pay(&self) {
        if self
            .pay_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("wallet pay ignored; payment in flight");
            return;
        }
        let claim = PayClaim {
            in_flight: &self.pay_in_flight,
        };
        let claimed = self.channel.update(|state| {
            state.can_pay().then(|| WalletState {
                is_loading: true,
                ..state.clone()
            })
        });
        if !claimed {
            debug!("wallet pay ignored");
            return;
        }
        self.cancel_requested.store(false, Ordering::SeqCst);

        let outcome = self.authorize_and_pay().await;

        self.channel.update(|state| {
            state.is_loading.then(|| WalletState {
                is_loading: false,
                ..state.clone()
            })
        });
        drop(claim);

        match outcome {
            Ok(result) => {
                info!(payment_id = %result.payment_id, "wallet payment created");
                self.host.payment_succeeded(result);
            }
            Err(err) if err.is_cancellation() => debug!("wallet sheet cancelled"),
            Err(err) => {
                error!(error = %err, "wallet payment failed");
                self.host.report_error(&err);
            }
        }
    }

    async fn authorize_and_pay(&self) -> Result<PaymentResult> {
        let authorization = self
            .bridge
            .invoke(self.sheet.as_ref(), self.request.clone())
            .await
            .map_err(FlowError::from)?;
        let token = self.interactor.tokenize(&authorization).await?;
        if self.cancel_requested.load(Ordering::SeqCst) {
            debug!("wallet cancelled after authorization; payment not created");
            return Err(ExternalSurfaceError::Cancelled.into());
        }
        self.interactor.create_payment(&token).await
    }

    /// Leaves the wallet flow. A sheet still on screen is dismissed and its
    /// authorization discarded; a payment already past the sheet is not
    /// created.
    pub fn cancel(&self) {
        if self.pay_in_flight.load(Ordering::SeqCst) {
            self.cancel_requested.store(true, Ordering::SeqCst);
        }
        if self.bridge.cancel_pending() {
            debug!("dismissing wallet sheet");
            self.sheet.dismiss();
        }
        self.channel.update(|state| {
            state.is_loading.then(|| WalletState {
                is_loading: false,
                ..state.clone()
            })
        });
        match self.presentation_context {
            PresentationContext::FromSelection => self.host.navigate_back(),
            PresentationContext::Direct => self.host.dismiss(),
        }
    }

    pub fn on_back(&self) {
        if self.presentation_context.should_show_back_button() {
            self.host.navigate_back();
        }
    }
}
