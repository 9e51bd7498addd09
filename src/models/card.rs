use serde::Serialize;
use strum::{Display, EnumIter, IntoEnumIterator};

use super::payer::{FieldMessage, FormField};

/// The three card inputs rendered by the gateway widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CardField {
    Number,
    Expiry,
    Cvc,
}

impl CardField {
    fn form_field(self) -> FormField {
        match self {
            CardField::Number => FormField::CardNumber,
            CardField::Expiry => FormField::CardExpiry,
            CardField::Cvc => FormField::CardCvc,
        }
    }

    fn missing_message(self) -> &'static str {
        match self {
            CardField::Number => "Card number is required",
            CardField::Expiry => "Expiry date is required",
            CardField::Cvc => "CVC is required",
        }
    }
}

/// Callback events reported by the gateway widget. They never carry card data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardFieldEvent {
    Changed { field: CardField, complete: bool },
    Blurred(CardField),
}

/// Completion flags per card field, as last reported by the widget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CardFieldState {
    pub number_complete: bool,
    pub expiry_complete: bool,
    pub cvc_complete: bool,
    #[serde(skip)]
    touched: [bool; 3],
}

impl CardFieldState {
    pub fn apply(&mut self, event: CardFieldEvent) {
        match event {
            CardFieldEvent::Changed { field, complete } => match field {
                CardField::Number => self.number_complete = complete,
                CardField::Expiry => self.expiry_complete = complete,
                CardField::Cvc => self.cvc_complete = complete,
            },
            CardFieldEvent::Blurred(field) => self.touched[field as usize] = true,
        }
    }

    pub fn is_complete(&self, field: CardField) -> bool {
        match field {
            CardField::Number => self.number_complete,
            CardField::Expiry => self.expiry_complete,
            CardField::Cvc => self.cvc_complete,
        }
    }

    pub fn is_touched(&self, field: CardField) -> bool {
        self.touched[field as usize]
    }

    pub fn all_complete(&self) -> bool {
        self.number_complete && self.expiry_complete && self.cvc_complete
    }

    /// Messages for fields the payer left incomplete after visiting them.
    pub fn touched_messages(&self) -> Vec<FieldMessage> {
        CardField::iter()
            .filter(|f| self.is_touched(*f) && !self.is_complete(*f))
            .map(|f| FieldMessage::new(f.form_field(), f.missing_message()))
            .collect()
    }

    /// Messages for every incomplete field, touched or not.
    pub fn missing_messages(&self) -> Vec<FieldMessage> {
        CardField::iter()
            .filter(|f| !self.is_complete(*f))
            .map(|f| FieldMessage::new(f.form_field(), f.missing_message()))
            .collect()
    }
}
