//! Physical controls and their identities.
//!
//! Soft buttons and knobs can be qualified with a profile page so that one
//! physical button set drives up to three logical sub-pages. Page up/down are
//! never qualified.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// A physical control on the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PanelControl {
    SoftButton1,
    SoftButton2,
    SoftButton3,
    SoftButton4,
    SoftButton5,
    SoftButton6,
    KnobLeftInc,
    KnobLeftDec,
    KnobRightInc,
    KnobRightDec,
    PageUp,
    PageDown,
}

impl PanelControl {
    /// All controls in code order.
    pub const ALL: [PanelControl; 12] = [
        PanelControl::SoftButton1,
        PanelControl::SoftButton2,
        PanelControl::SoftButton3,
        PanelControl::SoftButton4,
        PanelControl::SoftButton5,
        PanelControl::SoftButton6,
        PanelControl::KnobLeftInc,
        PanelControl::KnobLeftDec,
        PanelControl::KnobRightInc,
        PanelControl::KnobRightDec,
        PanelControl::PageUp,
        PanelControl::PageDown,
    ];

    /// Bit reported for this control in the adapter's button mask.
    pub fn mask_bit(&self) -> u32 {
        match self {
            PanelControl::KnobRightInc => 0x0002,
            PanelControl::KnobRightDec => 0x0004,
            PanelControl::KnobLeftInc => 0x0008,
            PanelControl::KnobLeftDec => 0x0010,
            PanelControl::SoftButton1 => 0x0020,
            PanelControl::SoftButton2 => 0x0040,
            PanelControl::SoftButton3 => 0x0080,
            PanelControl::SoftButton4 => 0x0100,
            PanelControl::SoftButton5 => 0x0200,
            PanelControl::SoftButton6 => 0x0400,
            PanelControl::PageUp => 0x0800,
            PanelControl::PageDown => 0x1000,
        }
    }

    /// Controls whose bits are set in `mask`, in code order.
    pub fn from_mask(mask: u32) -> impl Iterator<Item = PanelControl> {
        Self::ALL
            .into_iter()
            .filter(move |c| mask & c.mask_bit() != 0)
    }

    /// Whether this control accepts a profile page qualifier.
    pub fn is_pageable(&self) -> bool {
        !matches!(self, PanelControl::PageUp | PanelControl::PageDown)
    }

    fn offset(&self) -> u32 {
        *self as u32
    }

    fn name(&self) -> &'static str {
        match self {
            PanelControl::SoftButton1 => "SOFTBUTTON_1",
            PanelControl::SoftButton2 => "SOFTBUTTON_2",
            PanelControl::SoftButton3 => "SOFTBUTTON_3",
            PanelControl::SoftButton4 => "SOFTBUTTON_4",
            PanelControl::SoftButton5 => "SOFTBUTTON_5",
            PanelControl::SoftButton6 => "SOFTBUTTON_6",
            PanelControl::KnobLeftInc => "KNOB_LEFT_INC",
            PanelControl::KnobLeftDec => "KNOB_LEFT_DEC",
            PanelControl::KnobRightInc => "KNOB_RIGHT_INC",
            PanelControl::KnobRightDec => "KNOB_RIGHT_DEC",
            PanelControl::PageUp => "PAGE_UP",
            PanelControl::PageDown => "PAGE_DOWN",
        }
    }
}

impl fmt::Display for PanelControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PanelControl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidButton(s.to_string()))
    }
}

/// Logical sub-page sharing the physical button set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProfilePage {
    P1 = 1,
    P2 = 2,
    P3 = 3,
}

impl ProfilePage {
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(ProfilePage::P1),
            2 => Some(ProfilePage::P2),
            3 => Some(ProfilePage::P3),
            _ => None,
        }
    }

    pub fn number(&self) -> u8 {
        *self as u8
    }
}

/// A control, optionally qualified with a profile page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ButtonIdentity {
    control: PanelControl,
    page: Option<ProfilePage>,
}

impl ButtonIdentity {
    /// Unqualified identity.
    pub const fn new(control: PanelControl) -> Self {
        Self {
            control,
            page: None,
        }
    }

    /// Identity qualified with a profile page.
    ///
    /// Page up/down ignore the qualifier.
    pub fn on_page(control: PanelControl, page: ProfilePage) -> Self {
        Self {
            control,
            page: control.is_pageable().then_some(page),
        }
    }

    pub fn control(&self) -> PanelControl {
        self.control
    }

    pub fn page(&self) -> Option<ProfilePage> {
        self.page
    }

    /// Numeric device code.
    ///
    /// Unqualified soft buttons and knobs are 111-120, page-qualified ones
    /// 1-10, 11-20 and 21-30 for P1-P3, page up 1024 and page down 2048.
    pub fn code(&self) -> u32 {
        match (self.control, self.page) {
            (PanelControl::PageUp, _) => 1024,
            (PanelControl::PageDown, _) => 2048,
            (c, None) => 111 + c.offset(),
            (c, Some(p)) => (p.number() as u32 - 1) * 10 + 1 + c.offset(),
        }
    }

    /// Reverse of [`ButtonIdentity::code`].
    pub fn from_code(code: u32) -> Result<Self> {
        let pageable = &PanelControl::ALL[..10];
        match code {
            1024 => Ok(Self::new(PanelControl::PageUp)),
            2048 => Ok(Self::new(PanelControl::PageDown)),
            111..=120 => Ok(Self::new(pageable[(code - 111) as usize])),
            1..=30 => {
                let page = ProfilePage::from_number(((code - 1) / 10 + 1) as u8)
                    .ok_or_else(|| Error::InvalidButton(code.to_string()))?;
                Ok(Self::on_page(pageable[((code - 1) % 10) as usize], page))
            }
            _ => Err(Error::InvalidButton(code.to_string())),
        }
    }
}

impl From<PanelControl> for ButtonIdentity {
    fn from(control: PanelControl) -> Self {
        Self::new(control)
    }
}

impl fmt::Display for ButtonIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page {
            Some(p) => write!(f, "{}_P{}", self.control, p.number()),
            None => write!(f, "{}", self.control),
        }
    }
}

impl FromStr for ButtonIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some((base, suffix)) = s.rsplit_once("_P") {
            if let Some(page) = suffix.parse::<u8>().ok().and_then(ProfilePage::from_number) {
                let control: PanelControl = base.parse()?;
                if !control.is_pageable() {
                    return Err(Error::InvalidButton(s.to_string()));
                }
                return Ok(Self::on_page(control, page));
            }
        }
        Ok(Self::new(s.parse()?))
    }
}

/// Transition a binding reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Edge {
    /// Control went from released to pressed.
    #[default]
    OnTurnedOn,
    /// Control went from pressed to released.
    OnTurnedOff,
}

impl Edge {
    pub fn from_flag(turned_on: bool) -> Self {
        if turned_on {
            Edge::OnTurnedOn
        } else {
            Edge::OnTurnedOff
        }
    }

    pub fn is_turned_on(&self) -> bool {
        matches!(self, Edge::OnTurnedOn)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::OnTurnedOn => write!(f, "on"),
            Edge::OnTurnedOff => write!(f, "off"),
        }
    }
}

impl FromStr for Edge {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "on" | "1" | "pressed" => Ok(Edge::OnTurnedOn),
            "off" | "0" | "released" => Ok(Edge::OnTurnedOff),
            _ => Err(Error::InvalidArgument(format!("invalid edge: {}", s))),
        }
    }
}
