//! Live plot window.
//!
//! The window only reads: it polls a `watch` receiver for the latest
//! [`LiveFigure`] and a status line, and redraws once a second. The
//! acquisition keeps running on the tokio runtime, so a slow frame never
//! stalls the stage or the card.

use crate::control::AbortHandle;
use crate::figure::LiveFigure;
use eframe::egui;
use egui_plot::{Legend, Line, Plot, PlotPoints, Points};
use std::time::Duration;
use tokio::sync::watch;

/// How often the window redraws while nothing else happens.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// eframe app showing one live figure.
pub struct PlotWindow {
    figure: watch::Receiver<LiveFigure>,
    status: watch::Receiver<String>,
    abort: AbortHandle,
}

impl PlotWindow {
    /// Window over the given figure and status channels; the Abort button uses `abort`.
    pub fn new(
        figure: watch::Receiver<LiveFigure>,
        status: watch::Receiver<String>,
        abort: AbortHandle,
    ) -> Self {
        Self {
            figure,
            status,
            abort,
        }
    }
}

impl eframe::App for PlotWindow {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let figure = self.figure.borrow().clone();
        let status = self.status.borrow().clone();

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("Abort").clicked() {
                    self.abort.abort();
                }
                ui.label(status);
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading(&figure.title);
            Plot::new("live_figure")
                .legend(Legend::default())
                .x_axis_label(figure.x_label.clone())
                .y_axis_label(figure.y_label.clone())
                .show(ui, |plot_ui| {
                    for series in &figure.series {
                        plot_ui.line(
                            Line::new(PlotPoints::from(series.points.clone()))
                                .name(&series.label),
                        );
                        plot_ui.points(
                            Points::new(PlotPoints::from(series.points.clone()))
                                .radius(3.0)
                                .name(&series.label),
                        );
                    }
                });
        });

        ctx.request_repaint_after(REFRESH_INTERVAL);
    }
}

/// Open the window and block until it is closed.
pub fn run_plot_window(window: PlotWindow) -> eframe::Result<()> {
    let title = window.figure.borrow().title.clone();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([900.0, 600.0]),
        ..Default::default()
    };
    eframe::run_native(&title, options, Box::new(|_cc| Ok(Box::new(window))))
}
