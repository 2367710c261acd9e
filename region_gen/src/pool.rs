//! Fans raw-element batches out to per-worker translator clones, then folds
//! all the clones back into one accumulator.

use std::thread;

use anyhow::{anyhow, Result};
use crossbeam_channel::bounded;
use log::warn;

use crate::element::RawElement;
use crate::translator::Translators;

pub struct TranslatorsPool {
    accumulator: Translators,
    workers: Vec<thread::JoinHandle<(Translators, Result<()>)>>,
    dispatch: crossbeam_channel::Sender<Vec<RawElement>>,
}

impl TranslatorsPool {
    pub fn new(prototype: Translators, threads: usize) -> TranslatorsPool {
        // A rendezvous channel: emit() hands each batch straight to the next
        // idle worker and blocks while everybody is busy.
        let (dispatch, rx) = bounded::<Vec<RawElement>>(0);

        let mut workers = Vec::new();
        for idx in 0..threads.max(1) {
            let rx = rx.clone();
            let mut unit = prototype.clone_unit();
            let handle = thread::Builder::new()
                .name(format!("translator-{}", idx))
                .spawn(move || {
                    let mut result = Ok(());
                    for batch in rx.iter() {
                        if result.is_err() {
                            // Keep draining so dispatch never stalls; the
                            // error surfaces at finish().
                            continue;
                        }
                        for elem in &batch {
                            if let Err(err) = unit.emit(elem) {
                                result = Err(err);
                                break;
                            }
                        }
                    }
                    // Whatever sits in this clone's router buffers has to
                    // reach the queue before the unit is merged away.
                    if result.is_ok() {
                        result = unit.flush();
                    }
                    (unit, result)
                })
                .expect("spawning a translator worker");
            workers.push(handle);
        }

        TranslatorsPool {
            accumulator: prototype,
            workers,
            dispatch,
        }
    }

    /// Blocks until some worker picks the batch up.
    pub fn emit(&self, batch: Vec<RawElement>) -> Result<()> {
        self.dispatch
            .send(batch)
            .map_err(|_| anyhow!("every translation worker has exited"))
    }

    /// Waits for all in-flight batches, folds every clone into the
    /// accumulator, and finishes the accumulator once. Worker panics come
    /// back as errors, never as unwinding across the thread boundary.
    pub fn finish(self) -> Result<Translators> {
        let TranslatorsPool {
            mut accumulator,
            workers,
            dispatch,
        } = self;
        drop(dispatch);

        let mut first_err = None;
        for handle in workers {
            match handle.join() {
                Ok((unit, result)) => {
                    accumulator.merge(unit);
                    if let Err(err) = result {
                        warn!("a translation worker failed: {:#}", err);
                        first_err.get_or_insert(err);
                    }
                }
                Err(_) => {
                    first_err.get_or_insert(anyhow!("a translation worker panicked"));
                }
            }
        }
        if let Some(err) = first_err {
            return Err(err);
        }

        accumulator.finish()?;
        Ok(accumulator)
    }
}
