mod common;

use checkout_flow::application::bridge::{BridgeCallbacks, ExternalSurface};
use checkout_flow::application::wallet::{WalletAvailability, WalletScope, WalletSheet};
use checkout_flow::domain::payment::{Amount, WalletAuthorization, WalletRequest};
use checkout_flow::domain::state::PresentationContext;
use checkout_flow::error::ExternalSurfaceError;
use checkout_flow::infrastructure::in_memory::{HostEvent, RecordingHost, SandboxWalletSheet};
use common::{MockInteractor, john, wait_until};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct ManualWalletSheet {
    callbacks: Mutex<Option<BridgeCallbacks<WalletAuthorization>>>,
    presented: AtomicUsize,
    dismissals: AtomicUsize,
}

impl ExternalSurface for ManualWalletSheet {
    type Request = WalletRequest;
    type Output = WalletAuthorization;

    fn present(
        &self,
        _request: WalletRequest,
        callbacks: BridgeCallbacks<WalletAuthorization>,
    ) -> Result<(), ExternalSurfaceError> {
        self.presented.fetch_add(1, Ordering::SeqCst);
        *self.callbacks.lock().unwrap() = Some(callbacks);
        Ok(())
    }

    fn dismiss(&self) {
        self.dismissals.fetch_add(1, Ordering::SeqCst);
    }
}

impl WalletSheet for ManualWalletSheet {
    fn is_presentable(&self) -> bool {
        true
    }
}

fn request() -> WalletRequest {
    WalletRequest {
        merchant_name: "Acme".to_string(),
        amount: Amount::new(dec!(12.50)).unwrap(),
        currency_code: "USD".to_string(),
        country_code: "US".to_string(),
    }
}

fn wallet(
    sheet: Arc<dyn WalletSheet>,
    context: PresentationContext,
    timeout: Option<Duration>,
) -> (Arc<WalletScope>, Arc<MockInteractor>, Arc<RecordingHost>) {
    let interactor = Arc::new(MockInteractor::new(john()));
    let host = Arc::new(RecordingHost::new());
    let scope = WalletScope::new(
        sheet,
        interactor.clone(),
        host.clone(),
        request(),
        context,
        timeout,
    );
    (Arc::new(scope), interactor, host)
}

#[tokio::test]
async fn test_pay_creates_payment() {
    let sheet = Arc::new(SandboxWalletSheet::new(true, true));
    let (scope, interactor, host) = wallet(sheet, PresentationContext::FromSelection, None);
    let mut states = scope.state();

    scope.start();
    scope.pay().await;

    assert_eq!(interactor.calls("tokenize"), 1);
    assert_eq!(interactor.calls("create_payment"), 1);
    match host.events().as_slice() {
        [HostEvent::PaymentSucceeded(result)] => {
            assert_eq!(result.payment_id, "pay_tok_acme_12.50");
        }
        other => panic!("unexpected host events: {other:?}"),
    }

    let mut loading = Vec::new();
    while let Some(state) = states.try_next() {
        loading.push(state.is_loading);
    }
    assert_eq!(loading, vec![false, false, true, false]);
}

#[tokio::test]
async fn test_pay_is_noop_until_available() {
    let sheet = Arc::new(SandboxWalletSheet::new(false, true));
    let (scope, interactor, host) = wallet(sheet.clone(), PresentationContext::Direct, None);

    scope.pay().await;
    scope.start();
    assert_eq!(
        scope.current_state().availability,
        WalletAvailability::Unavailable("wallet is not set up on this device".to_string())
    );
    scope.pay().await;

    assert_eq!(interactor.calls("tokenize"), 0);
    assert!(host.events().is_empty());
    assert_eq!(sheet.dismissals(), 0);
}

#[tokio::test]
async fn test_cancelled_sheet_is_silent() {
    let sheet = Arc::new(SandboxWalletSheet::new(true, false));
    let (scope, interactor, host) = wallet(sheet, PresentationContext::Direct, None);
    scope.start();

    scope.pay().await;

    assert!(!scope.current_state().is_loading);
    assert_eq!(interactor.calls("tokenize"), 0);
    assert!(host.events().is_empty());
}

#[tokio::test]
async fn test_double_pay_presents_once() {
    let sheet = Arc::new(ManualWalletSheet::default());
    let (scope, interactor, host) =
        wallet(sheet.clone(), PresentationContext::FromSelection, None);
    scope.start();

    let first = {
        let scope = scope.clone();
        tokio::spawn(async move { scope.pay().await })
    };
    assert!(wait_until(|| sheet.callbacks.lock().unwrap().is_some()).await);
    assert!(scope.current_state().is_loading);

    scope.pay().await;
    assert_eq!(sheet.presented.load(Ordering::SeqCst), 1);

    let callbacks = sheet.callbacks.lock().unwrap().clone().unwrap();
    callbacks.succeeded(WalletAuthorization {
        payment_data: "blob".to_string(),
        network: None,
    });
    first.await.unwrap();

    assert_eq!(interactor.calls("tokenize"), 1);
    assert_eq!(host.events().len(), 1);
    assert!(!scope.current_state().is_loading);
}

#[tokio::test]
async fn test_pay_after_cancel_is_noop_and_late_authorization_discarded() {
    let sheet = Arc::new(ManualWalletSheet::default());
    let (scope, interactor, host) =
        wallet(sheet.clone(), PresentationContext::FromSelection, None);
    scope.start();

    let first = {
        let scope = scope.clone();
        tokio::spawn(async move { scope.pay().await })
    };
    assert!(wait_until(|| sheet.callbacks.lock().unwrap().is_some()).await);

    scope.cancel();
    scope.pay().await;
    let late = sheet.callbacks.lock().unwrap().clone().unwrap();
    assert!(!late.succeeded(WalletAuthorization {
        payment_data: "blob".to_string(),
        network: None,
    }));
    first.await.unwrap();

    assert_eq!(sheet.presented.load(Ordering::SeqCst), 1);
    assert_eq!(sheet.dismissals.load(Ordering::SeqCst), 1);
    assert_eq!(interactor.calls("tokenize"), 0);
    assert_eq!(host.events(), vec![HostEvent::NavigatedBack]);
    assert!(scope.current_state().can_pay());

    let retry = {
        let scope = scope.clone();
        tokio::spawn(async move { scope.pay().await })
    };
    assert!(wait_until(|| sheet.presented.load(Ordering::SeqCst) == 2).await);
    let callbacks = sheet.callbacks.lock().unwrap().clone().unwrap();
    assert!(callbacks.succeeded(WalletAuthorization {
        payment_data: "blob".to_string(),
        network: None,
    }));
    retry.await.unwrap();
    assert_eq!(interactor.calls("create_payment"), 1);
}

#[tokio::test]
async fn test_cancel_during_tokenize_skips_payment() {
    let sheet = Arc::new(SandboxWalletSheet::new(true, true));
    let (scope, interactor, host) =
        wallet(sheet.clone(), PresentationContext::Direct, None);
    let gate = interactor.gate("tokenize");
    scope.start();

    let first = {
        let scope = scope.clone();
        tokio::spawn(async move { scope.pay().await })
    };
    assert!(wait_until(|| interactor.calls("tokenize") == 1).await);

    scope.cancel();
    scope.pay().await;
    gate.notify_one();
    first.await.unwrap();

    assert_eq!(sheet.dismissals(), 0);
    assert_eq!(interactor.calls("tokenize"), 1);
    assert_eq!(interactor.calls("create_payment"), 0);
    assert_eq!(host.events(), vec![HostEvent::Dismissed]);
    assert!(!scope.current_state().is_loading);
}

#[tokio::test]
async fn test_sheet_timeout_is_reported() {
    let sheet = Arc::new(ManualWalletSheet::default());
    let (scope, interactor, host) = wallet(
        sheet.clone(),
        PresentationContext::FromSelection,
        Some(Duration::from_millis(20)),
    );
    scope.start();

    scope.pay().await;

    assert_eq!(sheet.dismissals.load(Ordering::SeqCst), 1);
    assert_eq!(interactor.calls("tokenize"), 0);
    assert_eq!(
        host.events(),
        vec![HostEvent::Error("external surface timed out".to_string())]
    );
    assert!(scope.current_state().can_pay());
}

#[tokio::test]
async fn test_tokenize_failure_is_reported() {
    let sheet = Arc::new(SandboxWalletSheet::new(true, true));
    let (scope, interactor, host) = wallet(sheet, PresentationContext::FromSelection, None);
    interactor.fail("tokenize");
    scope.start();

    scope.pay().await;

    assert_eq!(interactor.calls("create_payment"), 0);
    assert_eq!(
        host.events(),
        vec![HostEvent::Error("Interactor error: tokenize unavailable".to_string())]
    );
    assert!(!scope.current_state().is_loading);
}

#[tokio::test]
async fn test_cancel_and_back_follow_presentation_context() {
    let sheet = Arc::new(SandboxWalletSheet::new(true, true));
    let (scope, _, host) = wallet(sheet.clone(), PresentationContext::FromSelection, None);
    scope.on_back();
    scope.cancel();
    assert_eq!(
        host.events(),
        vec![HostEvent::NavigatedBack, HostEvent::NavigatedBack]
    );

    let (scope, _, host) = wallet(sheet, PresentationContext::Direct, None);
    scope.on_back();
    scope.cancel();
    assert_eq!(host.events(), vec![HostEvent::Dismissed]);
}
