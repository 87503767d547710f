use log::info;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::prelude::{SimError, SimResult};

/// F-number that requests the full aperture.
pub const FULL_APERTURE: f64 = -2.0;

/// Width (lateral) and length (elevational) of one rectangular element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementGeometry {
    pub width: f64,
    pub length: f64,
}

/// Per-element complex focusing factors for one aperture (transmit or receive).
///
/// Always holds exactly one entry per array element; elements outside the
/// active window are complex zero.
#[derive(Debug, Clone, PartialEq)]
pub struct FocusPhases {
    phases: Vec<Complex64>,
}

impl FocusPhases {
    pub fn as_slice(&self) -> &[Complex64] {
        &self.phases
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

/// Linear array of identical elements at a fixed pitch.
#[derive(Debug, Clone)]
pub struct ArrayGeometry {
    element: ElementGeometry,
    pitch: f64,
    element_count: usize,
    assumed_sound_speed: f64,
    transmit_f_number: f64,
    receive_f_number: f64,
}

impl ArrayGeometry {
    pub fn new(
        element: ElementGeometry,
        pitch: f64,
        element_count: usize,
        assumed_sound_speed: f64,
    ) -> SimResult<Self> {
        if element_count == 0 {
            return Err(SimError::InvalidGeometry(
                "array needs at least one element".into(),
            ));
        }
        if !(pitch > 0.0 && element.width > 0.0 && element.length > 0.0) {
            return Err(SimError::InvalidGeometry(format!(
                "pitch {} and element {:?} must be positive",
                pitch, element
            )));
        }
        if !(assumed_sound_speed > 0.0) {
            return Err(SimError::InvalidGeometry(format!(
                "assumed sound speed {} must be positive",
                assumed_sound_speed
            )));
        }

        info!(
            "array of {} elements, pitch {:.3e} m; transmit and receive use all elements",
            element_count, pitch
        );

        Ok(Self {
            element,
            pitch,
            element_count,
            assumed_sound_speed,
            transmit_f_number: FULL_APERTURE,
            receive_f_number: FULL_APERTURE,
        })
    }

    pub fn element(&self) -> ElementGeometry {
        self.element
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn element_count(&self) -> usize {
        self.element_count
    }

    pub fn assumed_sound_speed(&self) -> f64 {
        self.assumed_sound_speed
    }

    pub fn transmit_f_number(&self) -> f64 {
        self.transmit_f_number
    }

    pub fn receive_f_number(&self) -> f64 {
        self.receive_f_number
    }

    pub fn set_transmit_f_number(&mut self, f_number: f64) {
        self.transmit_f_number = f_number;
    }

    pub fn set_receive_f_number(&mut self, f_number: f64) {
        self.receive_f_number = f_number;
    }

    /// Unfocused phases for this array.
    pub fn focus_phases(&self) -> FocusPhases {
        FocusPhases {
            phases: vec![Complex64::new(1.0, 0.0); self.element_count],
        }
    }

    /// Signed lateral offset of element `index` from the array center.
    pub fn element_offset(&self, index: usize) -> f64 {
        (index as f64 - (self.element_count - 1) as f64 / 2.0) * self.pitch
    }

    /// Number of elements switched on for a focus at `focus` with `f_number`.
    pub fn active_elements(&self, focus: f64, f_number: f64) -> usize {
        let count = self.element_count as i64;
        let mut active = (focus / (f_number * self.pitch)) as i64;
        if active % 2 == 1 {
            active += 1;
        }
        if active < 1 || active > count {
            active = count;
        }
        active as usize
    }

    pub fn set_transmit_focus(&self, phases: &mut FocusPhases, focus: f64, frequency: f64) {
        self.set_focus(phases, focus, self.transmit_f_number, frequency);
    }

    pub fn set_receive_focus(&self, phases: &mut FocusPhases, focus: f64, frequency: f64) {
        self.set_focus(phases, focus, self.receive_f_number, frequency);
    }

    /// Spherical delay-and-sum law with a hard aperture cutoff.
    ///
    /// `focus <= 0` focuses at infinity: every element gets a unit phase.
    pub fn set_focus(&self, phases: &mut FocusPhases, focus: f64, f_number: f64, frequency: f64) {
        debug_assert_eq!(phases.len(), self.element_count);
        let phases = &mut phases.phases;

        if focus <= 0.0 {
            phases.fill(Complex64::new(1.0, 0.0));
            return;
        }

        let active = self.active_elements(focus, f_number);
        let first = (self.element_count - active) / 2;
        let last = first + active;
        let omega = 2.0 * PI * frequency;

        for (index, phase) in phases.iter_mut().enumerate() {
            *phase = if (first..last).contains(&index) {
                let x = self.element_offset(index);
                let delay = (focus - (x * x + focus * focus).sqrt()) / self.assumed_sound_speed;
                Complex64::from_polar(1.0, omega * delay)
            } else {
                Complex64::new(0.0, 0.0)
            };
        }
    }
}
