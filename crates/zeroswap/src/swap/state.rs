use crate::registry::{self, Token};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapState {
    pub sell_token: Token,
    pub buy_token: Token,
    pub chain_id: u64,
    pub input_amount: String,
    pub should_debounce: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapAction {
    TypeSellAmount(String),
    /// Carries the buy amount shown at the moment of the toggle; it becomes the new input.
    ToggleDirection(String),
    SelectSellToken(Token),
    SelectBuyToken(Token),
    SelectChain(u64),
    /// Clear the amount after a finished swap so the user can start over.
    ResetSwap,
}

impl SwapState {
    pub fn has_amount(&self) -> bool {
        !self.input_amount.trim().is_empty()
    }
}

impl Default for SwapState {
    fn default() -> Self {
        let chain = registry::default_chain();
        let (sell_token, buy_token) = chain.default_pair();
        Self {
            sell_token,
            buy_token,
            chain_id: chain.id,
            input_amount: String::new(),
            should_debounce: true,
        }
    }
}

/// Pure transition function for the swap form.
///
/// After every action the sell and buy tokens differ and both belong to `chain_id`.
/// Token selections from another chain and unsupported chain ids leave the state as is.
pub fn reduce(state: &SwapState, action: SwapAction) -> SwapState {
    let mut next = state.clone();
    match action {
        SwapAction::TypeSellAmount(value) => {
            next.input_amount = value;
            next.should_debounce = true;
        }
        SwapAction::ToggleDirection(output_amount) => {
            next.input_amount = output_amount;
            next.should_debounce = false;
            next.sell_token = state.buy_token;
            next.buy_token = state.sell_token;
        }
        SwapAction::SelectSellToken(token) => {
            if !belongs_to(state.chain_id, &token) {
                return next;
            }
            if token.address == state.buy_token.address {
                next.buy_token = state.sell_token;
            }
            next.sell_token = token;
        }
        SwapAction::SelectBuyToken(token) => {
            if !belongs_to(state.chain_id, &token) {
                return next;
            }
            if token.address == state.sell_token.address {
                next.sell_token = state.buy_token;
            }
            next.buy_token = token;
        }
        SwapAction::SelectChain(chain_id) => {
            if let Some(chain) = registry::chain(chain_id) {
                let (sell, buy) = chain.default_pair();
                next.chain_id = chain_id;
                next.sell_token = sell;
                next.buy_token = buy;
            }
        }
        SwapAction::ResetSwap => {
            next.input_amount.clear();
            next.should_debounce = true;
        }
    }
    next
}

fn belongs_to(chain_id: u64, token: &Token) -> bool {
    registry::chain(chain_id).is_some_and(|c| c.contains(token))
}
